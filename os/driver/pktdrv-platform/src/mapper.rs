//! # Linear address to CPU pointer translation
//!
//! Memory services hand out *linear* addresses: a DOS segment times 16, the
//! 32-bit base of a locked XMS block. How the driver reaches them depends on
//! how it was built. A flat DPMI client whose data selector has base 0 sees
//! them one to one; a host-side test maps them into a buffer that stands for
//! the machine's memory.

use pktdrv_addresses::PhysicalAddress;

/// Converts service-reported linear addresses into CPU pointers.
pub trait PhysMapper {
    /// CPU pointer to the byte at linear address `pa`.
    ///
    /// Returning the pointer is safe; dereferencing it is not, and requires
    /// that the caller owns the range through the service that produced it.
    fn linear_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;

    /// Typed view of linear memory.
    ///
    /// # Safety
    /// The range `[pa, pa + size_of::<T>())` must be mapped, suitably aligned
    /// for `T`, and exclusively owned by the caller for `'a`.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T
    where
        Self: Sized,
    {
        let ptr = self.linear_to_ptr(pa).cast::<T>();
        // SAFETY: upheld by the caller.
        unsafe { &mut *ptr }
    }
}

impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    fn linear_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        (**self).linear_to_ptr(pa)
    }
}

/// Linear address equals CPU address (flat model, zero-based selectors).
#[derive(Copy, Clone, Debug, Default)]
pub struct IdentityMapper;

impl PhysMapper for IdentityMapper {
    fn linear_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        core::ptr::with_exposed_provenance_mut(pa.as_usize())
    }
}
