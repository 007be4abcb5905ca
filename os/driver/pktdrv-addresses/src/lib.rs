//! # Real-Mode and Physical Address Types
//!
//! Strongly typed wrappers for the two address forms a DOS packet driver has to
//! juggle: the flat 32-bit **physical** address that a bus-master or ISA DMA
//! controller sees, and the **segmented** `segment:offset` pair the CPU uses in
//! real or virtual-8086 mode.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PhysicalAddress`] | A linear physical address as seen by a DMA engine. |
//! | [`SegmentAddress`] | A real-mode far pointer (`segment * 16 + offset`). |
//! | [`Boundary`] | Sealed marker for a power-of-two alignment boundary. |
//!
//! All boundary and ceiling arithmetic used by the DMA buffer allocator lives
//! in this crate, so that checks such as "does this buffer cross a 64 KiB line"
//! are written exactly once.
//!
//! ```rust
//! # use pktdrv_addresses::*;
//! let seg = SegmentAddress::new(0x1234, 0x0567);
//! let pa = seg.linear();
//! assert_eq!(pa.as_u32(), 0x128A7);
//!
//! // 0xFFF0 + 0x20 runs over the next 64 KiB line
//! let buf = PhysicalAddress::new(0x0001_FFF0);
//! assert!(buf.crosses::<Size64K>(0x20));
//! assert!(!buf.crosses::<Size64K>(0x10));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod physical_address;
mod segment_address;

use core::fmt;
use core::hash::Hash;

pub use physical_address::PhysicalAddress;
pub use segment_address::SegmentAddress;

/// Bytes per real-mode paragraph.
pub const PARAGRAPH: u32 = 16;

/// First byte above conventional memory (640 KiB).
pub const CONVENTIONAL_LIMIT: PhysicalAddress = PhysicalAddress::new(0x000A_0000);

/// Lowest segment that belongs to the upper memory area.
///
/// A UMB provider returning anything below this segment handed out
/// conventional memory instead.
pub const UPPER_MEMORY_SEGMENT: u16 = 0xA000;

/// First byte of the high memory area (1 MiB).
pub const HIGH_MEMORY_START: PhysicalAddress = PhysicalAddress::new(0x0010_0000);

/// Highest address + 1 reachable by the ISA DMA controller (24 address lines).
pub const LEGACY_DMA_CEILING: PhysicalAddress = PhysicalAddress::new(0x0100_0000);

/// Sealed trait pattern to restrict `Boundary` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for power-of-two address boundaries.
pub trait Boundary:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Debug
{
    /// Boundary size in bytes (power of two).
    const SIZE: u32;
    /// log2(SIZE).
    const SHIFT: u32;

    fn as_str() -> &'static str;
}

/// 16-byte paragraph.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Paragraph;
impl sealed::Sealed for Paragraph {}
impl Boundary for Paragraph {
    const SIZE: u32 = PARAGRAPH;
    const SHIFT: u32 = 4;

    fn as_str() -> &'static str {
        "16"
    }
}

/// 4 KiB page, the granularity at which memory managers remap.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Size4K;
impl sealed::Sealed for Size4K {}
impl Boundary for Size4K {
    const SIZE: u32 = 4096;
    const SHIFT: u32 = 12;

    fn as_str() -> &'static str {
        "4K"
    }
}

/// 64 KiB, the page register granularity of the ISA DMA controller.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Size64K;
impl sealed::Sealed for Size64K {}
impl Boundary for Size64K {
    const SIZE: u32 = 64 * 1024;
    const SHIFT: u32 = 16;

    fn as_str() -> &'static str {
        "64K"
    }
}

/// Number of paragraphs needed to hold `bytes`, or `None` if that does not fit
/// a 16-bit paragraph count.
#[inline]
#[must_use]
pub fn paragraphs_for(bytes: usize) -> Option<u16> {
    let paras = bytes.div_ceil(PARAGRAPH as usize);
    u16::try_from(paras).ok()
}

/// Number of whole KiB needed to hold `bytes`, or `None` on overflow of `u16`.
#[inline]
#[must_use]
pub fn kib_for(bytes: usize) -> Option<u16> {
    u16::try_from(bytes.div_ceil(1024)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_rounding() {
        assert_eq!(paragraphs_for(0), Some(0));
        assert_eq!(paragraphs_for(1), Some(1));
        assert_eq!(paragraphs_for(16), Some(1));
        assert_eq!(paragraphs_for(17), Some(2));
        assert_eq!(paragraphs_for(0x10_0000), None);
    }

    #[test]
    fn kib_rounding() {
        assert_eq!(kib_for(1), Some(1));
        assert_eq!(kib_for(1024), Some(1));
        assert_eq!(kib_for(1025), Some(2));
        assert_eq!(kib_for(64 * 1024 * 1024), None);
    }

    #[test]
    fn boundary_constants_are_consistent() {
        assert_eq!(1 << Paragraph::SHIFT, Paragraph::SIZE);
        assert_eq!(1 << Size4K::SHIFT, Size4K::SIZE);
        assert_eq!(1 << Size64K::SHIFT, Size64K::SIZE);
        assert_eq!(Size64K::as_str(), "64K");
    }

    #[test]
    fn memory_map_landmarks() {
        assert_eq!(
            SegmentAddress::new(UPPER_MEMORY_SEGMENT, 0).linear(),
            CONVENTIONAL_LIMIT
        );
        assert!(CONVENTIONAL_LIMIT < HIGH_MEMORY_START);
        assert!(HIGH_MEMORY_START < LEGACY_DMA_CEILING);
    }
}
