use crate::{PARAGRAPH, PhysicalAddress};
use core::fmt;

/// Real-mode far pointer: `segment:offset`, linear address `segment * 16 + offset`.
///
/// Many distinct pairs alias the same linear address. [`normalize`](Self::normalize)
/// is the single canonicalization point; every comparison between far pointers in
/// this workspace goes through it or through [`linear`](Self::linear).
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct SegmentAddress {
    pub segment: u16,
    pub offset: u16,
}

impl SegmentAddress {
    /// Highest linear address a far pointer can form (`FFFF:FFFF`, the HMA top).
    pub const MAX_LINEAR: u32 = 0x0010_FFEF;

    #[inline]
    #[must_use]
    pub const fn new(segment: u16, offset: u16) -> Self {
        Self { segment, offset }
    }

    /// Start of a paragraph-aligned block as returned by DOS and UMB services.
    #[inline]
    #[must_use]
    pub const fn from_segment(segment: u16) -> Self {
        Self::new(segment, 0)
    }

    /// The 20(+1)-bit linear address this pointer denotes, A20 enabled.
    #[inline]
    #[must_use]
    pub const fn linear(self) -> PhysicalAddress {
        PhysicalAddress::new(((self.segment as u32) << 4) + self.offset as u32)
    }

    /// Canonical form with `offset < 16`.
    ///
    /// Returns `None` for pointers into the HMA (`linear() >= 1 MiB`), which
    /// have no canonical form with a 16-bit segment.
    #[inline]
    #[must_use]
    pub const fn normalize(self) -> Option<Self> {
        Self::from_linear(self.linear())
    }

    /// Canonical far pointer for a linear address below 1 MiB.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_linear(pa: PhysicalAddress) -> Option<Self> {
        let lin = pa.as_u32();
        let segment = lin >> 4;
        if segment > u16::MAX as u32 {
            return None;
        }
        Some(Self::new(segment as u16, (lin & (PARAGRAPH - 1)) as u16))
    }
}

impl fmt::Debug for SegmentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.segment, self.offset)
    }
}

impl fmt::Display for SegmentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
