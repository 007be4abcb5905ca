use crate::Ring;
use bitfield_struct::bitfield;

/// CR0 as seen by a 32-bit x86 processor.
///
/// The low word is the 286 machine status word, which `SMSW` returns at any
/// privilege level. The cache control bits live in the high word and need a
/// full `mov reg, cr0` at CPL 0.
#[bitfield(u32)]
pub struct Cr0 {
    /// Bit 0, Protection Enable. Set under a V86 monitor even though the
    /// program believes it runs in real mode.
    pub pe_protection_enable: bool,
    /// Bit 1, Monitor Coprocessor.
    pub mp_monitor_coprocessor: bool,
    /// Bit 2, x87 emulation.
    pub em_emulation: bool,
    /// Bit 3, Task Switched.
    pub ts_task_switched: bool,
    /// Bit 4, Extension Type (387 present on a 386).
    pub et_extension_type: bool,
    /// Bit 5, Numeric Error reporting through `#MF` (486+).
    pub ne_numeric_error: bool,
    #[bits(10, default = 0)]
    _reserved_6_15: u16,
    /// Bit 16, supervisor Write Protect (486+).
    pub wp_write_protect: bool,
    #[bits(default = 0)]
    _reserved_17: bool,
    /// Bit 18, Alignment Mask (486+).
    pub am_alignment_mask: bool,
    #[bits(10, default = 0)]
    _reserved_19_28: u16,
    /// Bit 29, Not Write-through (486+).
    pub nw_not_write_through: bool,
    /// Bit 30, Cache Disable (486+).
    pub cd_cache_disable: bool,
    /// Bit 31, Paging.
    pub pg_paging: bool,
}

impl Cr0 {
    /// Machine status word via `SMSW`; the high word reads as zero.
    #[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
    #[inline]
    #[must_use]
    pub fn read_msw() -> Self {
        let msw: u16;
        unsafe {
            core::arch::asm!("smsw {0:x}", out(reg) msw, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(u32::from(msw))
    }

    /// Full register.
    ///
    /// # Safety
    /// Must run at CPL 0 (real mode counts); faults otherwise.
    #[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn read() -> Self {
        let cr0: usize;
        unsafe {
            core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr0 as u32)
    }

    /// Whether the CPU caches are enabled (`CD` clear).
    #[inline]
    #[must_use]
    pub const fn caching_enabled(self) -> bool {
        !self.cd_cache_disable()
    }
}

/// How the driver is executing relative to any memory manager.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExecutionMode {
    /// `PE` clear: plain real mode, no one else owns the page tables.
    Real,
    /// Protected mode at CPL 0.
    Protected,
    /// `PE` set below CPL 0. A V86 monitor (EMM386, QEMM, Windows) or a DPMI
    /// host owns paging and traps privileged instructions.
    Virtual8086,
}

impl ExecutionMode {
    #[must_use]
    pub const fn classify(msw: Cr0, cpl: Ring) -> Self {
        if !msw.pe_protection_enable() {
            Self::Real
        } else if matches!(cpl, Ring::Ring0) {
            Self::Protected
        } else {
            Self::Virtual8086
        }
    }

    /// Effective privilege level; real mode behaves like ring 0.
    #[must_use]
    pub const fn effective_ring(self, cpl: Ring) -> Ring {
        match self {
            Self::Real => Ring::Ring0,
            Self::Protected | Self::Virtual8086 => cpl,
        }
    }

    #[must_use]
    pub const fn is_virtualized(self) -> bool {
        matches!(self, Self::Virtual8086)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_disable_bit() {
        let cr0 = Cr0::new().with_cd_cache_disable(true);
        assert_eq!(cr0.into_bits(), 1 << 30);
        assert!(!cr0.caching_enabled());
        assert!(Cr0::new().caching_enabled());
    }

    #[test]
    fn mode_classification() {
        let real = Cr0::new();
        let pe = Cr0::new().with_pe_protection_enable(true);
        assert_eq!(ExecutionMode::classify(real, Ring::Ring3), ExecutionMode::Real);
        assert_eq!(
            ExecutionMode::classify(pe, Ring::Ring0),
            ExecutionMode::Protected
        );
        assert_eq!(
            ExecutionMode::classify(pe, Ring::Ring3),
            ExecutionMode::Virtual8086
        );
        assert_eq!(ExecutionMode::Real.effective_ring(Ring::Ring3), Ring::Ring0);
        assert!(ExecutionMode::Virtual8086.is_virtualized());
    }
}
