use bitfield_struct::bitfield;
use core::fmt;
use pktdrv_cpu::CpuFacts;

/// Memory managers that run DOS in V86 mode and may remap pages under a
/// transfer. Detected independently; several can be active at once.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct PagingManagers {
    /// VCPI server (`INT 67h AX=DE00h`).
    pub vcpi: bool,
    /// Windows 3.x/9x enhanced mode.
    pub windows_enhanced: bool,
    /// EMM386 or any EMS emulator answering on `INT 67h`.
    pub emm386: bool,
    /// Quarterdeck QEMM-386.
    pub qemm: bool,
    #[bits(4)]
    _reserved: u8,
}

impl PagingManagers {
    /// Whether at least one manager was detected.
    #[inline]
    #[must_use]
    pub const fn any(self) -> bool {
        self.vcpi() || self.windows_enhanced() || self.emm386() || self.qemm()
    }
}

/// DOS version as reported by `INT 21h AH=30h`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct DosVersion {
    pub major: u8,
    pub minor: u8,
}

impl DosVersion {
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for DosVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// Immutable snapshot of the runtime environment, taken once at load.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CapabilityFacts {
    /// A Virtual DMA Services provider answers on `INT 4Bh`.
    pub mediated_dma: bool,
    pub dos_version: DosVersion,
    /// An XMS driver (HIMEM.SYS or a memory manager providing XMS) is loaded.
    pub xms_present: bool,
    /// Paging managers found; `None` when detection skipped these checks
    /// because a VDS provider was already found.
    pub paging: Option<PagingManagers>,
    pub cpu: CpuFacts,
}

impl CapabilityFacts {
    /// Whether any paging or V86 manager was reported.
    #[inline]
    #[must_use]
    pub fn any_paging_manager(&self) -> bool {
        self.paging.is_some_and(PagingManagers::any)
    }

    /// Extended memory through a plain XMS driver, nobody remapping pages.
    #[inline]
    #[must_use]
    pub fn himem_only(&self) -> bool {
        !self.mediated_dma && self.xms_present && !self.any_paging_manager()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktdrv_cpu::CpuClass;

    #[test]
    fn any_manager() {
        assert!(!PagingManagers::new().any());
        assert!(PagingManagers::new().with_qemm(true).any());
        assert!(
            PagingManagers::new()
                .with_vcpi(true)
                .with_emm386(true)
                .any()
        );
    }

    #[test]
    fn himem_only_requires_no_paging() {
        let mut facts = CapabilityFacts {
            mediated_dma: false,
            dos_version: DosVersion::new(6, 22),
            xms_present: true,
            paging: Some(PagingManagers::new()),
            cpu: CpuFacts::for_class(CpuClass::I80486),
        };
        assert!(facts.himem_only());

        facts.paging = Some(PagingManagers::new().with_windows_enhanced(true));
        assert!(!facts.himem_only());
        assert!(facts.any_paging_manager());

        facts.paging = None;
        assert!(!facts.any_paging_manager());
    }

    #[test]
    fn version_formatting() {
        assert_eq!(DosVersion::new(6, 22).to_string(), "6.22");
        assert_eq!(DosVersion::new(7, 10).to_string(), "7.10");
        assert_eq!(DosVersion::new(5, 0).to_string(), "5.00");
    }
}
