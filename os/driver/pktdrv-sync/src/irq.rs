//! Interrupt flag control.
//!
//! With the `asm` feature on an `x86`/`x86_64` target these functions execute
//! `cli`, `sti` and `pushf`. Without it (hosted unit tests, documentation builds)
//! they compile to nothing and [`interrupts_enabled`] reports `false`, so
//! [`IrqGuard`] never attempts to re-enable anything.

/// Bit 9 of `FLAGS`/`EFLAGS`/`RFLAGS`.
pub const FLAGS_IF: usize = 1 << 9;

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
mod arch {
    /// Disables maskable hardware interrupts (`cli`).
    ///
    /// # Safety & Privilege
    ///
    /// Requires IOPL >= CPL. Under a V86 monitor the instruction traps and is
    /// virtualized; this is still the correct way to mask the virtual IF.
    #[inline]
    pub fn cli() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    /// Enables maskable hardware interrupts (`sti`).
    #[inline]
    pub fn sti() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }

    /// Returns the flags register (via `pushf/pop`).
    #[inline]
    #[must_use]
    pub fn flags() -> usize {
        let r: usize;
        unsafe { core::arch::asm!("pushf", "pop {}", out(reg) r, options(preserves_flags)) }
        r
    }
}

#[cfg(not(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64"))))]
mod arch {
    #[inline]
    pub const fn cli() {}

    #[inline]
    pub const fn sti() {}

    #[inline]
    #[must_use]
    pub const fn flags() -> usize {
        0
    }
}

pub use arch::{cli, flags, sti};

/// Whether maskable interrupts are currently enabled.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    flags() & FLAGS_IF != 0
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// Guards nest: an inner guard created while interrupts are already masked
/// leaves them masked when it drops, and only the outermost guard re-enables.
///
/// Hold it across list and table mutations only. Service calls (`INT 2Fh`,
/// XMS far calls) and logging happen with interrupts in whatever state the
/// caller had.
///
/// ```
/// use pktdrv_sync::IrqGuard;
///
/// {
///     let _g = IrqGuard::new();
///     // free-list surgery
/// }
/// ```
pub struct IrqGuard {
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = interrupts_enabled();
        if enabled {
            cli();
        }
        Self {
            were_enabled: enabled,
        }
    }

    /// Whether this guard will re-enable interrupts when dropped.
    #[inline]
    #[must_use]
    pub const fn restores(&self) -> bool {
        self.were_enabled
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            sti();
        }
    }
}

#[cfg(all(test, not(feature = "asm")))]
mod tests {
    use super::*;

    #[test]
    fn hosted_build_never_toggles() {
        assert!(!interrupts_enabled());
        let outer = IrqGuard::new();
        let inner = IrqGuard::default();
        assert!(!outer.restores());
        assert!(!inner.restores());
    }
}
