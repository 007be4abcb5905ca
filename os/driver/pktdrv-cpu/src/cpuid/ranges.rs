use crate::cpuid::CpuidResult;

pub const LEAF_00H: u32 = 0x00;

/// Decoded `cpuid(0, 0)`: highest basic leaf and vendor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CpuidRanges {
    pub max_basic: u32,
    pub vendor: CpuVendor,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CpuVendor {
    Intel,
    Amd,
    Cyrix,
    Other,
}

impl CpuidRanges {
    /// # Safety
    /// `CPUID` must be available.
    #[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
    #[must_use]
    pub unsafe fn read() -> Self {
        Self::from_leaf0(unsafe { crate::cpuid::cpuid(LEAF_00H, 0) })
    }

    /// Decodes the vendor string held in EBX, EDX, ECX (in that order).
    #[must_use]
    pub fn from_leaf0(r: CpuidResult) -> Self {
        let mut id = [0u8; 12];
        id[0..4].copy_from_slice(&r.ebx.to_le_bytes());
        id[4..8].copy_from_slice(&r.edx.to_le_bytes());
        id[8..12].copy_from_slice(&r.ecx.to_le_bytes());

        let vendor = match &id {
            b"GenuineIntel" => CpuVendor::Intel,
            b"AuthenticAMD" => CpuVendor::Amd,
            b"CyrixInstead" => CpuVendor::Cyrix,
            _ => CpuVendor::Other,
        };

        Self {
            max_basic: r.eax,
            vendor,
        }
    }

    #[inline]
    #[must_use]
    pub const fn has_basic(&self, leaf: u32) -> bool {
        leaf <= self.max_basic
    }
}

impl CpuVendor {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Intel => "Intel",
            Self::Amd => "AMD",
            Self::Cyrix => "Cyrix",
            Self::Other => "Other",
        }
    }
}
