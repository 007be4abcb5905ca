//! # Driver memory core
//!
//! Ties the load-time decisions and the allocators together behind one
//! object:
//!
//! ```text
//! parameter string ──→ DriverConfig
//!                           │
//! collect_facts() ──→ CapabilityFacts ──→ decide() + BUSMASTER/PIO ──→ DmaPolicy ─┐
//!                           └───→ CoherencyPlan ──────────────────────────┤
//!                                                                         ↓
//!                                  MemoryCore { TieredAllocator, DmaAllocator, CacheSync }
//!                                                                         │
//!                                                    registry::get_dma_policy()
//! ```
//!
//! Transfer code asks the core for DMA buffers and brackets every transfer
//! with the prepare/complete hooks. Under [`DmaPolicy::Forbidden`] the core
//! refuses DMA buffers and the caller moves packets by PIO.
//!
//! [`DmaPolicy::Forbidden`]: pktdrv_dma::DmaPolicy::Forbidden

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod config;
mod logging;
mod memory;
pub mod registry;

pub use config::{ConfigError, DriverConfig};
pub use logging::init_logging;
pub use memory::{CoreError, DEGRADE_STEPS, MemoryCore, Services, degrade_sizes};
pub use registry::get_dma_policy;
