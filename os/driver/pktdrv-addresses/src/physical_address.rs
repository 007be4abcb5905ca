use crate::Boundary;
use core::fmt;
use core::ops::{Add, AddAssign};

/// Physical memory address as driven onto the bus by a DMA engine.
///
/// The upper bound of the 386/486 era physical address space is 4 GiB, so the
/// value is a plain `u32`. Arithmetic that can overflow is exposed through
/// `checked_*` helpers; the operators assume the caller already validated the
/// range.
///
/// ### Examples
/// ```rust
/// # use pktdrv_addresses::*;
/// let pa = PhysicalAddress::new(0x0002_0013);
/// assert_eq!(pa.align_up(32), Some(PhysicalAddress::new(0x0002_0020)));
/// assert_eq!(pa.align_down::<Size64K>(), PhysicalAddress::new(0x0002_0000));
/// assert!(pa.fits_below(LEGACY_DMA_CEILING, 4096));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u32);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    /// Interprets a pointer as an identity-mapped physical address.
    ///
    /// Returns `None` if the pointer lies above the 32-bit physical space.
    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
        u32::try_from(ptr.addr()).ok().map(Self)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Distance in bytes from `base` up to `self`, if `self >= base`.
    #[inline]
    #[must_use]
    pub const fn offset_from(self, base: Self) -> Option<u32> {
        self.0.checked_sub(base.0)
    }

    /// Whether the address is a multiple of `align` (a power of two).
    #[inline]
    #[must_use]
    pub const fn is_aligned(self, align: u32) -> bool {
        debug_assert!(align.is_power_of_two());
        self.0 & (align - 1) == 0
    }

    /// Rounds up to the next multiple of `align` (a power of two).
    ///
    /// Returns `None` if the rounded value leaves the 32-bit space.
    #[inline]
    #[must_use]
    pub const fn align_up(self, align: u32) -> Option<Self> {
        debug_assert!(align.is_power_of_two());
        let mask = align - 1;
        match self.0.checked_add(mask) {
            Some(v) => Some(Self(v & !mask)),
            None => None,
        }
    }

    /// Rounds down to the start of the enclosing `B` region.
    #[inline]
    #[must_use]
    pub const fn align_down<B: Boundary>(self) -> Self {
        Self(self.0 & !(B::SIZE - 1))
    }

    /// Start of the next `B` region strictly above this address's region.
    #[inline]
    #[must_use]
    pub const fn next_boundary<B: Boundary>(self) -> Option<Self> {
        self.align_down::<B>().checked_add(B::SIZE)
    }

    /// Whether the byte range `[self, self + len)` spans two `B` regions.
    ///
    /// An empty range never crosses anything.
    #[inline]
    #[must_use]
    pub const fn crosses<B: Boundary>(self, len: u32) -> bool {
        if len == 0 {
            return false;
        }
        let first = self.as_u64() >> B::SHIFT;
        let last = (self.as_u64() + len as u64 - 1) >> B::SHIFT;
        first != last
    }

    /// Exclusive end address of a `len` byte range starting here.
    #[inline]
    #[must_use]
    pub const fn end(self, len: u32) -> Option<Self> {
        self.checked_add(len)
    }

    /// Whether `[self, self + len)` lies entirely below `ceiling`.
    #[inline]
    #[must_use]
    pub const fn fits_below(self, ceiling: Self, len: u32) -> bool {
        self.as_u64() + len as u64 <= ceiling.as_u64()
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:08X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for PhysicalAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u32 {
    #[inline]
    fn from(v: PhysicalAddress) -> Self {
        v.0
    }
}

impl Add<u32> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LEGACY_DMA_CEILING, Paragraph, Size4K, Size64K};

    #[test]
    fn align_up_and_down() {
        let pa = PhysicalAddress::new(0x1_2345);
        assert_eq!(pa.align_up(16), Some(PhysicalAddress::new(0x1_2350)));
        assert_eq!(pa.align_up(1), Some(pa));
        assert_eq!(pa.align_down::<Paragraph>(), PhysicalAddress::new(0x1_2340));
        assert_eq!(pa.align_down::<Size4K>(), PhysicalAddress::new(0x1_2000));
        assert_eq!(PhysicalAddress::new(u32::MAX).align_up(64), None);
    }

    #[test]
    fn aligned_checks() {
        assert!(PhysicalAddress::new(0x40).is_aligned(64));
        assert!(!PhysicalAddress::new(0x50).is_aligned(64));
        assert!(PhysicalAddress::zero().is_aligned(4096));
    }

    #[test]
    fn crossing_64k() {
        let at_line = PhysicalAddress::new(0x3_0000);
        assert!(!at_line.crosses::<Size64K>(0x1_0000));
        assert!(at_line.crosses::<Size64K>(0x1_0001));

        let below = PhysicalAddress::new(0x2_FFFF);
        assert!(!below.crosses::<Size64K>(1));
        assert!(below.crosses::<Size64K>(2));
        assert!(!below.crosses::<Size64K>(0));
    }

    #[test]
    fn crossing_near_top_of_space_does_not_overflow() {
        let pa = PhysicalAddress::new(u32::MAX - 3);
        assert!(!pa.crosses::<Size64K>(4));
        assert!(pa.end(4).is_none());
        assert!(!pa.fits_below(LEGACY_DMA_CEILING, 4));
    }

    #[test]
    fn next_boundary_steps_one_region() {
        let pa = PhysicalAddress::new(0x1_FFF0);
        assert_eq!(
            pa.next_boundary::<Size64K>(),
            Some(PhysicalAddress::new(0x2_0000))
        );
        assert_eq!(
            PhysicalAddress::new(0x2_0000).next_boundary::<Size64K>(),
            Some(PhysicalAddress::new(0x3_0000))
        );
    }

    #[test]
    fn ceiling_is_exclusive() {
        let pa = PhysicalAddress::new(0x00FF_F000);
        assert!(pa.fits_below(LEGACY_DMA_CEILING, 0x1000));
        assert!(!pa.fits_below(LEGACY_DMA_CEILING, 0x1001));
    }

    #[test]
    fn offsets() {
        let base = PhysicalAddress::new(0x1000);
        assert_eq!((base + 0x20).offset_from(base), Some(0x20));
        assert_eq!(base.offset_from(base + 1), None);
    }

    #[test]
    fn formatting() {
        let pa = PhysicalAddress::new(0xC_8000);
        assert_eq!(format!("{pa}"), "0x000C8000");
        assert_eq!(format!("{pa:?}"), "PA(0x000C8000)");
    }
}
