/// x86 privilege rings.
///
/// Only two matter to a DOS driver: ring 0 (real mode, or a protected-mode
/// kernel that may run `WBINVD`) and ring 3 (V86 mode or a DPMI client).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Ring {
    Ring0 = 0,
    Ring1 = 1,
    Ring2 = 2,
    Ring3 = 3,
}

impl Ring {
    /// Decodes the low two bits of a selector.
    #[inline]
    #[must_use]
    pub const fn from_selector(sel: u16) -> Self {
        match sel & 0b11 {
            0 => Self::Ring0,
            1 => Self::Ring1,
            2 => Self::Ring2,
            _ => Self::Ring3,
        }
    }

    /// Current privilege level from the `CS` RPL bits.
    ///
    /// Meaningless in real mode; see [`crate::ExecutionMode::effective_ring`].
    #[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
    #[inline]
    #[must_use]
    pub fn current() -> Self {
        let cs: u16;
        unsafe {
            core::arch::asm!("mov {0:x}, cs", out(reg) cs, options(nomem, nostack, preserves_flags));
        }
        Self::from_selector(cs)
    }

    #[inline]
    #[must_use]
    pub const fn is_most_privileged(self) -> bool {
        matches!(self, Self::Ring0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_rpl_bits() {
        assert_eq!(Ring::from_selector(0x0008), Ring::Ring0);
        assert_eq!(Ring::from_selector(0x001B), Ring::Ring3);
        assert_eq!(Ring::from_selector(0x0011), Ring::Ring1);
        assert!(Ring::Ring0.is_most_privileged());
        assert!(!Ring::Ring3.is_most_privileged());
    }
}
