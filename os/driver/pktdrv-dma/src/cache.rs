//! Cache maintenance instructions.

/// The instructions the prepare/complete hooks are built from. Tests count
/// them instead of executing them.
pub trait CacheOps {
    /// Writes back and invalidates the line containing `line` (`CLFLUSH`).
    ///
    /// # Safety
    /// `line` must point into memory owned by the caller.
    unsafe fn flush_line(&mut self, line: *const u8);

    /// Writes back and invalidates the entire cache (`WBINVD`).
    fn flush_all(&mut self);

    /// Reads one byte of the line containing `line`.
    ///
    /// # Safety
    /// `line` must point into memory owned by the caller.
    unsafe fn touch_line(&mut self, line: *const u8);

    /// Orders all earlier memory accesses before all later ones.
    fn fence(&mut self);
}

impl<T: CacheOps + ?Sized> CacheOps for &mut T {
    unsafe fn flush_line(&mut self, line: *const u8) {
        unsafe { (**self).flush_line(line) }
    }

    fn flush_all(&mut self) {
        (**self).flush_all();
    }

    unsafe fn touch_line(&mut self, line: *const u8) {
        unsafe { (**self).touch_line(line) }
    }

    fn fence(&mut self) {
        (**self).fence();
    }
}

/// The real instructions.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[derive(Copy, Clone, Debug, Default)]
pub struct X86CacheOps;

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl CacheOps for X86CacheOps {
    #[inline]
    unsafe fn flush_line(&mut self, line: *const u8) {
        unsafe { core::arch::asm!("clflush [{}]", in(reg) line, options(nostack, preserves_flags)) }
    }

    /// Only selected when the CPU reported ring 0 outside V86 mode.
    #[inline]
    fn flush_all(&mut self) {
        unsafe { core::arch::asm!("wbinvd", options(nostack, preserves_flags)) }
    }

    #[inline]
    unsafe fn touch_line(&mut self, line: *const u8) {
        let _ = unsafe { core::ptr::read_volatile(line) };
    }

    #[inline]
    fn fence(&mut self) {
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }
}
