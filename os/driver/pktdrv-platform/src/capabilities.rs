use crate::{CapabilityFacts, DosVersion, PagingManagers, RealModeServices, detect};
use log::info;
use pktdrv_cpu::CpuFacts;

/// The questions fact collection asks of its environment, one per detector.
pub trait Environment {
    fn vds_present(&mut self) -> bool;
    fn vcpi_present(&mut self) -> bool;
    fn windows_enhanced(&mut self) -> bool;
    fn emm386_present(&mut self) -> bool;
    fn qemm_present(&mut self) -> bool;
    fn xms_present(&mut self) -> bool;
    fn dos_version(&mut self) -> DosVersion;
    fn cpu(&mut self) -> CpuFacts;
}

/// Answers [`Environment`] through the classic DOS installation checks.
pub struct BiosEnvironment<R> {
    services: R,
    cpu: CpuFacts,
}

impl<R: RealModeServices> BiosEnvironment<R> {
    pub const fn new(services: R, cpu: CpuFacts) -> Self {
        Self { services, cpu }
    }

    /// Reads the running processor for the CPU part of the facts.
    #[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
    pub fn with_detected_cpu(services: R) -> Self {
        Self::new(services, CpuFacts::detect())
    }

    pub fn into_inner(self) -> R {
        self.services
    }
}

impl<R: RealModeServices> Environment for BiosEnvironment<R> {
    fn vds_present(&mut self) -> bool {
        detect::vds_present(&mut self.services)
    }

    fn vcpi_present(&mut self) -> bool {
        detect::vcpi_present(&mut self.services)
    }

    fn windows_enhanced(&mut self) -> bool {
        detect::windows_enhanced(&mut self.services)
    }

    fn emm386_present(&mut self) -> bool {
        detect::emm386_present(&mut self.services)
    }

    fn qemm_present(&mut self) -> bool {
        detect::qemm_present(&mut self.services)
    }

    fn xms_present(&mut self) -> bool {
        detect::xms_present(&mut self.services)
    }

    fn dos_version(&mut self) -> DosVersion {
        detect::dos_version(&mut self.services)
    }

    fn cpu(&mut self) -> CpuFacts {
        self.cpu
    }
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

/// Takes the capability snapshot. Never fails: a missing feature is a fact.
///
/// VDS is asked first. When it answers, the paging manager checks are
/// skipped, since a VDS provider already mediates whatever remapping they do.
pub fn collect_facts<E: Environment + ?Sized>(env: &mut E) -> CapabilityFacts {
    let mediated_dma = env.vds_present();
    info!("VDS services: {}", if mediated_dma { "present" } else { "not present" });

    let dos_version = env.dos_version();
    info!("DOS version: {dos_version}");

    let xms_present = env.xms_present();

    let paging = if mediated_dma {
        None
    } else {
        let managers = PagingManagers::new()
            .with_vcpi(env.vcpi_present())
            .with_windows_enhanced(env.windows_enhanced())
            .with_emm386(env.emm386_present())
            .with_qemm(env.qemm_present());
        info!(
            "VCPI={} WinEnh={} EMM386={} QEMM={} HIMEM-only={}",
            yes_no(managers.vcpi()),
            yes_no(managers.windows_enhanced()),
            yes_no(managers.emm386()),
            yes_no(managers.qemm()),
            yes_no(xms_present && !managers.any())
        );
        Some(managers)
    };

    let cpu = env.cpu();
    info!(
        "CPU: {} cache={} clflush={} wbinvd={} line={}",
        cpu.class,
        yes_no(cpu.has_internal_cache()),
        yes_no(cpu.can_clflush()),
        yes_no(cpu.can_wbinvd()),
        cpu.cache_line_size
    );

    CapabilityFacts {
        mediated_dma,
        dos_version,
        xms_present,
        paging,
        cpu,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktdrv_cpu::CpuClass;

    #[derive(Default)]
    struct Fixed {
        vds: bool,
        vcpi: bool,
        windows: bool,
        emm386: bool,
        qemm: bool,
        xms: bool,
        paging_queries: usize,
    }

    impl Environment for Fixed {
        fn vds_present(&mut self) -> bool {
            self.vds
        }
        fn vcpi_present(&mut self) -> bool {
            self.paging_queries += 1;
            self.vcpi
        }
        fn windows_enhanced(&mut self) -> bool {
            self.paging_queries += 1;
            self.windows
        }
        fn emm386_present(&mut self) -> bool {
            self.paging_queries += 1;
            self.emm386
        }
        fn qemm_present(&mut self) -> bool {
            self.paging_queries += 1;
            self.qemm
        }
        fn xms_present(&mut self) -> bool {
            self.xms
        }
        fn dos_version(&mut self) -> DosVersion {
            DosVersion::new(6, 22)
        }
        fn cpu(&mut self) -> CpuFacts {
            CpuFacts::for_class(CpuClass::Pentium)
        }
    }

    #[test]
    fn vds_short_circuits_paging_checks() {
        let mut env = Fixed {
            vds: true,
            emm386: true,
            ..Fixed::default()
        };
        let facts = collect_facts(&mut env);
        assert!(facts.mediated_dma);
        assert_eq!(facts.paging, None);
        assert_eq!(env.paging_queries, 0);
    }

    #[test]
    fn managers_are_checked_independently() {
        let mut env = Fixed {
            windows: true,
            qemm: true,
            xms: true,
            ..Fixed::default()
        };
        let facts = collect_facts(&mut env);
        let managers = facts.paging.unwrap();
        assert!(managers.windows_enhanced());
        assert!(managers.qemm());
        assert!(!managers.vcpi());
        assert!(!managers.emm386());
        assert_eq!(env.paging_queries, 4);
        assert!(!facts.himem_only());
    }

    #[test]
    fn plain_himem() {
        let mut env = Fixed {
            xms: true,
            ..Fixed::default()
        };
        let facts = collect_facts(&mut env);
        assert!(facts.himem_only());
        assert_eq!(facts.dos_version, DosVersion::new(6, 22));
        assert_eq!(facts.cpu.class, CpuClass::Pentium);
    }
}
