use crate::{CpuClass, CpuVendor, CpuidRanges, ExecutionMode, Leaf01h, Ring};

/// Read-only snapshot of everything cache maintenance depends on.
///
/// Produced once by [`CpuFacts::detect`] (with the `asm` feature) or built
/// directly from known values.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CpuFacts {
    pub class: CpuClass,
    pub vendor: CpuVendor,
    pub has_cpuid: bool,
    /// `CLFLUSH` implemented.
    pub clflush: bool,
    /// Processor snoops its own cache (CPUID.01H:EDX.SS).
    pub self_snoop: bool,
    /// Cache line size in bytes; 0 when there is no cache.
    pub cache_line_size: u16,
    /// `CR0.CD` clear, or assumed so when CR0 is not readable.
    pub cache_enabled: bool,
    /// Effective privilege level.
    pub ring: Ring,
    pub mode: ExecutionMode,
}

impl CpuFacts {
    /// Facts for a processor of `class` without CPUID, running in real mode.
    #[must_use]
    pub const fn for_class(class: CpuClass) -> Self {
        Self {
            class,
            vendor: CpuVendor::Other,
            has_cpuid: false,
            clflush: false,
            self_snoop: false,
            cache_line_size: class.default_line_size(),
            cache_enabled: class.has_internal_cache(),
            ring: Ring::Ring0,
            mode: ExecutionMode::Real,
        }
    }

    /// Decodes CPUID leaves 0 and 1. Privilege defaults to real mode.
    #[must_use]
    pub fn from_cpuid(ranges: CpuidRanges, leaf1: Option<Leaf01h>) -> Self {
        let Some(leaf1) = leaf1 else {
            // CPUID without leaf 1 only existed on some late 486 steppings
            let mut facts = Self::for_class(CpuClass::I80486);
            facts.vendor = ranges.vendor;
            facts.has_cpuid = true;
            return facts;
        };

        let class = CpuClass::from_family(leaf1.family());
        let mut facts = Self::for_class(class);
        facts.vendor = ranges.vendor;
        facts.has_cpuid = true;
        facts.self_snoop = leaf1.has_self_snoop();
        if let Some(line) = leaf1.clflush_line_bytes() {
            facts.clflush = true;
            facts.cache_line_size = line;
        }
        facts
    }

    #[must_use]
    pub const fn with_clflush(mut self, line_size: u16) -> Self {
        self.clflush = true;
        self.cache_line_size = line_size;
        self
    }

    #[must_use]
    pub const fn with_privilege(mut self, ring: Ring, mode: ExecutionMode) -> Self {
        self.ring = ring;
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// An internal cache exists and is switched on.
    #[inline]
    #[must_use]
    pub const fn has_internal_cache(&self) -> bool {
        self.class.has_internal_cache() && self.cache_enabled
    }

    #[inline]
    #[must_use]
    pub const fn can_clflush(&self) -> bool {
        self.has_internal_cache() && self.clflush
    }

    /// `WBINVD` exists on this processor.
    #[inline]
    #[must_use]
    pub const fn wbinvd_available(&self) -> bool {
        self.class.has_wbinvd()
    }

    /// `WBINVD` may be executed here: ring 0 and no V86 monitor that would
    /// trap or silently drop it.
    #[inline]
    #[must_use]
    pub const fn wbinvd_permitted(&self) -> bool {
        self.ring.is_most_privileged() && !self.mode.is_virtualized()
    }

    #[inline]
    #[must_use]
    pub const fn can_wbinvd(&self) -> bool {
        self.wbinvd_available() && self.wbinvd_permitted()
    }

    /// Reads the facts of the running processor.
    #[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
    #[must_use]
    pub fn detect() -> Self {
        use crate::Cr0;
        use crate::class::{alignment_check_supported, cpuid_supported};

        let facts = if cpuid_supported() {
            let ranges = unsafe { CpuidRanges::read() };
            let leaf1 = unsafe { Leaf01h::read(&ranges) };
            Self::from_cpuid(ranges, leaf1)
        } else if alignment_check_supported() {
            Self::for_class(CpuClass::I80486)
        } else {
            Self::for_class(CpuClass::I80386)
        };

        let cpl = Ring::current();
        let mode = ExecutionMode::classify(Cr0::read_msw(), cpl);
        let ring = mode.effective_ring(cpl);
        let facts = facts.with_privilege(ring, mode);

        if ring.is_most_privileged() && facts.class.has_internal_cache() {
            let cr0 = unsafe { Cr0::read() };
            facts.with_cache_enabled(cr0.caching_enabled())
        } else {
            facts
        }
    }
}
