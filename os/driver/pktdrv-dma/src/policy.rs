use core::fmt;
use log::warn;
use pktdrv_platform::CapabilityFacts;

/// Whether, and how, the NIC may master the bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DmaPolicy {
    /// Physical addresses are stable; program the device with them directly.
    Direct,
    /// A VDS provider translates and pins pages on the driver's behalf; every
    /// buffer is locked through it before use.
    CommonBuffer,
    /// Pages may move under a transfer. Bus mastering is off; PIO only.
    Forbidden,
}

impl DmaPolicy {
    #[inline]
    #[must_use]
    pub const fn allows_bus_master(self) -> bool {
        !matches!(self, Self::Forbidden)
    }

    /// Transfers must fall back to programmed I/O.
    #[inline]
    #[must_use]
    pub const fn pio_fallback(self) -> bool {
        matches!(self, Self::Forbidden)
    }

    /// Buffers must be locked through the mediated DMA service.
    #[inline]
    #[must_use]
    pub const fn requires_mediation(self) -> bool {
        matches!(self, Self::CommonBuffer)
    }

    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Direct => "bus master DMA with physical addresses",
            Self::CommonBuffer => "bus master DMA through VDS",
            Self::Forbidden => "DMA disabled, using PIO",
        }
    }

    /// Applies the `BUSMASTER=` setting. Configuration can switch DMA off, but
    /// never on where the environment forbids it.
    #[must_use]
    pub fn with_override(self, setting: BusMasterOverride) -> Self {
        match (self, setting) {
            (_, BusMasterOverride::Off) => Self::Forbidden,
            (Self::Forbidden, BusMasterOverride::On) => {
                warn!("BUSMASTER=ON ignored: DMA is not safe in this environment");
                Self::Forbidden
            }
            (policy, _) => policy,
        }
    }
}

impl fmt::Display for DmaPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// The `BUSMASTER=` configuration value.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum BusMasterOverride {
    #[default]
    Auto,
    On,
    Off,
}

/// Derives the DMA policy. First match wins:
///
/// 1. a VDS provider answers: [`DmaPolicy::CommonBuffer`];
/// 2. any paging or V86 manager without VDS: [`DmaPolicy::Forbidden`];
/// 3. otherwise: [`DmaPolicy::Direct`].
#[must_use]
pub fn decide(facts: &CapabilityFacts) -> DmaPolicy {
    if facts.mediated_dma {
        DmaPolicy::CommonBuffer
    } else if facts.any_paging_manager() {
        DmaPolicy::Forbidden
    } else {
        DmaPolicy::Direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktdrv_cpu::{CpuClass, CpuFacts};
    use pktdrv_platform::{DosVersion, PagingManagers};

    /// Every combination of VDS, XMS, short-circuited detection and the four
    /// manager bits.
    fn all_facts() -> impl Iterator<Item = CapabilityFacts> {
        let mut paging = vec![None];
        paging.extend((0u8..16).map(|bits| Some(PagingManagers::from_bits(bits))));
        [false, true].into_iter().flat_map(move |mediated_dma| {
            let paging = paging.clone();
            [false, true].into_iter().flat_map(move |xms_present| {
                paging.clone().into_iter().map(move |paging| CapabilityFacts {
                    mediated_dma,
                    dos_version: DosVersion::new(6, 22),
                    xms_present,
                    paging,
                    cpu: CpuFacts::for_class(CpuClass::I80486),
                })
            })
        })
    }

    #[test]
    fn decide_is_pure() {
        for facts in all_facts() {
            assert_eq!(decide(&facts), decide(&facts));
        }
    }

    #[test]
    fn vds_dominates() {
        for facts in all_facts().filter(|f| f.mediated_dma) {
            assert_eq!(decide(&facts), DmaPolicy::CommonBuffer, "{facts:?}");
        }
    }

    #[test]
    fn paging_without_vds_forbids() {
        for facts in all_facts().filter(|f| !f.mediated_dma && f.any_paging_manager()) {
            let policy = decide(&facts);
            assert_eq!(policy, DmaPolicy::Forbidden, "{facts:?}");
            assert!(policy.pio_fallback());
        }
    }

    #[test]
    fn nothing_detected_is_direct() {
        let mut count = 0;
        for facts in all_facts().filter(|f| !f.mediated_dma && !f.any_paging_manager()) {
            assert_eq!(decide(&facts), DmaPolicy::Direct, "{facts:?}");
            count += 1;
        }
        // XMS on/off times (skipped detection, empty bit set)
        assert_eq!(count, 4);
    }

    #[test]
    fn override_only_restricts() {
        use BusMasterOverride::{Auto, Off, On};
        assert_eq!(DmaPolicy::Direct.with_override(Auto), DmaPolicy::Direct);
        assert_eq!(DmaPolicy::Direct.with_override(Off), DmaPolicy::Forbidden);
        assert_eq!(DmaPolicy::CommonBuffer.with_override(On), DmaPolicy::CommonBuffer);
        assert_eq!(DmaPolicy::Forbidden.with_override(On), DmaPolicy::Forbidden);
    }

    #[test]
    fn predicates() {
        assert!(DmaPolicy::Direct.allows_bus_master());
        assert!(!DmaPolicy::Direct.requires_mediation());
        assert!(DmaPolicy::CommonBuffer.requires_mediation());
        assert!(!DmaPolicy::Forbidden.allows_bus_master());
        assert_eq!(DmaPolicy::Forbidden.to_string(), "DMA disabled, using PIO");
    }
}
