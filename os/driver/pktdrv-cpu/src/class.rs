/// Processor generation, ordered by capability.
///
/// The 486 introduced the on-chip cache together with `INVD`/`WBINVD`; the
/// Pentium 4 introduced `CLFLUSH`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum CpuClass {
    I8086,
    I80286,
    I80386,
    I80486,
    Pentium,
    /// Pentium Pro and everything after it.
    P6,
}

impl CpuClass {
    /// Maps a CPUID effective family to a class.
    #[must_use]
    pub const fn from_family(family: u16) -> Self {
        match family {
            0..=3 => Self::I80386,
            4 => Self::I80486,
            5 => Self::Pentium,
            _ => Self::P6,
        }
    }

    #[inline]
    #[must_use]
    pub const fn has_internal_cache(self) -> bool {
        self as u8 >= Self::I80486 as u8
    }

    #[inline]
    #[must_use]
    pub const fn has_wbinvd(self) -> bool {
        self as u8 >= Self::I80486 as u8
    }

    /// Cache line size to assume when CPUID does not report one.
    #[must_use]
    pub const fn default_line_size(self) -> u16 {
        match self {
            Self::I8086 | Self::I80286 | Self::I80386 => 0,
            Self::I80486 => 16,
            Self::Pentium | Self::P6 => 32,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::I8086 => "8086",
            Self::I80286 => "80286",
            Self::I80386 => "80386",
            Self::I80486 => "80486",
            Self::Pentium => "Pentium",
            Self::P6 => "P6+",
        }
    }
}

impl core::fmt::Display for CpuClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `EFLAGS.AC`, writable from the 486 on.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
const FLAGS_AC: usize = 1 << 18;

/// `EFLAGS.ID`, writable iff `CPUID` exists.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
const FLAGS_ID: usize = 1 << 21;

/// Whether `mask` can be flipped in the flags register. The original flags
/// are restored before returning.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
fn flag_toggles(mask: usize) -> bool {
    let before: usize;
    let after: usize;
    unsafe {
        core::arch::asm!(
            "pushf",
            "pop {before}",
            "mov {tmp}, {before}",
            "xor {tmp}, {mask}",
            "push {tmp}",
            "popf",
            "pushf",
            "pop {after}",
            "push {before}",
            "popf",
            before = out(reg) before,
            after = out(reg) after,
            tmp = out(reg) _,
            mask = in(reg) mask,
        );
    }
    (before ^ after) & mask != 0
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[must_use]
pub fn cpuid_supported() -> bool {
    flag_toggles(FLAGS_ID)
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[must_use]
pub fn alignment_check_supported() -> bool {
    flag_toggles(FLAGS_AC)
}
