//! Cache coherency tier selection.

use core::fmt;
use log::info;
use pktdrv_cpu::CpuFacts;
use pktdrv_platform::CapabilityFacts;

/// Strongest cache maintenance the CPU can safely perform around a transfer.
///
/// Ordered from weakest to strongest, so `max` picks the better tier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum CoherencyTier {
    /// No internal cache; nothing to maintain.
    NotNeeded,
    /// Touch the buffer's lines and fence (386 class, or `WBINVD` not allowed).
    SoftwareBarrier,
    /// Write back and invalidate the whole cache (`WBINVD`, 486+ at ring 0).
    FullFlushInstruction,
    /// Flush individual lines (`CLFLUSH`).
    SurgicalInstruction,
}

impl CoherencyTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotNeeded => "not needed",
            Self::SoftwareBarrier => "software barrier",
            Self::FullFlushInstruction => "WBINVD",
            Self::SurgicalInstruction => "CLFLUSH",
        }
    }
}

impl fmt::Display for CoherencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a bus snooping test run against the NIC.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SnoopTestResult {
    /// Device writes always invalidated stale lines.
    Full,
    /// Some transfers came back stale.
    Partial,
    /// No snooping observed.
    Absent,
}

/// Picks the coherency tier. The snoop result never changes the tier; it only
/// decides, through [`CoherencyPlan::hooks_required`], whether call sites run
/// the hooks at all.
#[must_use]
pub fn select(facts: &CapabilityFacts, _snoop: Option<SnoopTestResult>) -> CoherencyTier {
    select_for_cpu(&facts.cpu)
}

#[must_use]
pub const fn select_for_cpu(cpu: &CpuFacts) -> CoherencyTier {
    if !cpu.has_internal_cache() {
        CoherencyTier::NotNeeded
    } else if cpu.can_clflush() {
        CoherencyTier::SurgicalInstruction
    } else if cpu.can_wbinvd() {
        CoherencyTier::FullFlushInstruction
    } else {
        CoherencyTier::SoftwareBarrier
    }
}

/// The selected tier together with what the hooks need to execute it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CoherencyPlan {
    pub tier: CoherencyTier,
    pub snoop: Option<SnoopTestResult>,
    /// Bytes per cache line; never 0.
    pub line_size: u16,
}

/// Fallback when the CPU reports no line size: the 486 line.
const DEFAULT_LINE_SIZE: u16 = 16;

impl CoherencyPlan {
    #[must_use]
    pub fn new(facts: &CapabilityFacts, snoop: Option<SnoopTestResult>) -> Self {
        let tier = select(facts, snoop);
        let line_size = match facts.cpu.cache_line_size {
            0 => DEFAULT_LINE_SIZE,
            n => n,
        };
        info!("Cache coherency: {tier}, {line_size}-byte lines, snoop {snoop:?}");
        Self {
            tier,
            snoop,
            line_size,
        }
    }

    /// Whether transfer code must call the prepare/complete hooks. False when
    /// there is nothing to maintain or the bus snoops fully.
    #[must_use]
    pub fn hooks_required(&self) -> bool {
        self.tier != CoherencyTier::NotNeeded && self.snoop != Some(SnoopTestResult::Full)
    }
}
