//! Process-wide snapshot of the load-time DMA decisions.
//!
//! Transfer paths and interrupt handlers that have no reference to the
//! [`MemoryCore`](crate::MemoryCore) read the decision from here. It is
//! written once during driver init and never changes afterwards.

use log::warn;
use pktdrv_dma::{CoherencyPlan, DmaPolicy};
use pktdrv_sync::SyncOnceCell;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DmaSnapshot {
    pub policy: DmaPolicy,
    pub coherency: CoherencyPlan,
}

static SNAPSHOT: SyncOnceCell<DmaSnapshot> = SyncOnceCell::new();

/// Publishes the decisions. Only the first call has any effect.
///
/// Returns `false` if a snapshot was already published.
#[must_use]
pub fn publish(snapshot: DmaSnapshot) -> bool {
    match SNAPSHOT.set(snapshot) {
        Ok(()) => true,
        Err(rejected) => {
            if SNAPSHOT.get() != Some(&rejected) {
                warn!("DMA policy already published; keeping the first decision");
            }
            false
        }
    }
}

#[must_use]
pub fn snapshot() -> Option<&'static DmaSnapshot> {
    SNAPSHOT.get()
}

/// The published policy, or [`DmaPolicy::Forbidden`] before init has run.
#[must_use]
pub fn get_dma_policy() -> DmaPolicy {
    SNAPSHOT.get().map_or(DmaPolicy::Forbidden, |s| s.policy)
}
