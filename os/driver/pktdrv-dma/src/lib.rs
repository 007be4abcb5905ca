//! # DMA safety decisions
//!
//! Two decisions are taken once, from the [`CapabilityFacts`] snapshot, and
//! then passed around as plain data:
//!
//! * [`DmaPolicy`]: may the NIC master the bus at all, and if so, must every
//!   buffer be locked through Virtual DMA Services first?
//! * [`CoherencyTier`]: which cache maintenance brackets a transfer.
//!
//! [`CacheSync`] turns the tier into the prepare/complete hooks transfer code
//! calls around every PIO or DMA operation.
//!
//! [`CapabilityFacts`]: pktdrv_platform::CapabilityFacts

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod cache;
pub mod coherency;
pub mod policy;
mod sync;

pub use cache::CacheOps;
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
pub use cache::X86CacheOps;
pub use coherency::{CoherencyPlan, CoherencyTier, SnoopTestResult, select};
pub use policy::{BusMasterOverride, DmaPolicy, decide};
pub use sync::CacheSync;
