use crate::cpuid::{CpuidRanges, CpuidResult};
use bitfield_struct::bitfield;

pub const LEAF_01H: u32 = 0x01;

/// CPUID.01H, the version and feature leaf.
///
/// Only the fields relevant to cache maintenance are decoded; the rest of the
/// feature words is kept raw.
#[derive(Copy, Clone, Debug)]
pub struct Leaf01h {
    pub eax: Leaf1Eax,
    pub ebx: Leaf1Ebx,
    pub edx: Leaf1Edx,
}

impl Leaf01h {
    /// Query CPUID.01H if supported; returns `None` if `ranges` says leaf 1 is absent.
    ///
    /// # Safety
    /// `CPUID` must be available.
    #[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
    #[inline]
    #[must_use]
    pub unsafe fn read(ranges: &CpuidRanges) -> Option<Self> {
        if !ranges.has_basic(LEAF_01H) {
            return None;
        }
        let r = unsafe { crate::cpuid::cpuid(LEAF_01H, 0) };
        Some(Self::decode(r))
    }

    /// Query helper for tests and for callers that already hold the registers.
    #[inline]
    #[must_use]
    pub const fn from_result(ranges: &CpuidRanges, r: CpuidResult) -> Option<Self> {
        if !ranges.has_basic(LEAF_01H) {
            return None;
        }
        Some(Self::decode(r))
    }

    #[must_use]
    pub const fn decode(r: CpuidResult) -> Self {
        Self {
            eax: Leaf1Eax::from_bits(r.eax),
            ebx: Leaf1Ebx::from_bits(r.ebx),
            edx: Leaf1Edx::from_bits(r.edx),
        }
    }

    #[inline]
    #[must_use]
    pub fn family(&self) -> u16 {
        self.eax.effective_family()
    }

    #[inline]
    #[must_use]
    pub const fn model(&self) -> u8 {
        self.eax.effective_model()
    }

    /// `CLFLUSH` implemented.
    #[inline]
    #[must_use]
    pub const fn has_clflush(&self) -> bool {
        self.edx.clfsh()
    }

    /// Processor snoops its own cache for writes to cached lines.
    #[inline]
    #[must_use]
    pub const fn has_self_snoop(&self) -> bool {
        self.edx.ss()
    }

    /// `CLFLUSH` line size in bytes, or `None` if the field is not valid.
    #[inline]
    #[must_use]
    pub fn clflush_line_bytes(&self) -> Option<u16> {
        if !self.has_clflush() {
            return None;
        }
        match self.ebx.clflush_line_bytes() {
            0 => None,
            n => Some(n),
        }
    }
}

/// CPUID.01H:EAX, version information.
#[bitfield(u32)]
pub struct Leaf1Eax {
    #[bits(4)]
    pub stepping: u8,
    #[bits(4)]
    pub model: u8,
    #[bits(4)]
    pub family: u8,
    #[bits(2)]
    pub cpu_type: u8,
    #[bits(2)]
    _rsv14_15: u8,
    #[bits(4)]
    pub ext_model: u8,
    #[bits(8)]
    pub ext_family: u16,
    #[bits(4)]
    _rsv28_31: u8,
}

impl Leaf1Eax {
    /// Base family, plus the extended family when the base reads `0Fh`.
    #[inline]
    #[must_use]
    pub fn effective_family(self) -> u16 {
        let fam = u16::from(self.family());
        if fam == 0x0F {
            fam + self.ext_family()
        } else {
            fam
        }
    }

    /// Base model, extended by `ext_model` for families `06h` and `0Fh`.
    #[inline]
    #[must_use]
    pub const fn effective_model(self) -> u8 {
        let fam = self.family();
        if fam == 0x06 || fam == 0x0F {
            self.model() | (self.ext_model() << 4)
        } else {
            self.model()
        }
    }
}

/// CPUID.01H:EBX.
#[bitfield(u32)]
pub struct Leaf1Ebx {
    #[bits(8)]
    pub brand_index: u8,
    /// CLFLUSH line size in 8-byte units (bits 15:8).
    #[bits(8)]
    pub clflush_line_size_8b: u8,
    #[bits(8)]
    pub logical_processor_count: u8,
    #[bits(8)]
    pub initial_apic_id: u8,
}

impl Leaf1Ebx {
    #[inline]
    #[must_use]
    pub fn clflush_line_bytes(self) -> u16 {
        u16::from(self.clflush_line_size_8b()) * 8
    }
}

/// CPUID.01H:EDX, the subset of legacy feature flags we look at.
#[bitfield(u32)]
pub struct Leaf1Edx {
    /// x87 FPU on chip (bit 0).
    pub fpu: bool,
    #[bits(3)]
    _bits1_3: u8,
    /// Time-stamp counter (bit 4).
    pub tsc: bool,
    #[bits(14)]
    _bits5_18: u16,
    /// `CLFLUSH` (bit 19).
    pub clfsh: bool,
    #[bits(6)]
    _bits20_25: u8,
    /// SSE2, which also brings `MFENCE` (bit 26).
    pub sse2: bool,
    /// Self-snoop (bit 27).
    pub ss: bool,
    #[bits(4)]
    _bits28_31: u8,
}
