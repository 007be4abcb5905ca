//! # Tiered driver memory
//!
//! Three pools, one per DOS memory tier, each growing in arenas obtained from
//! its service:
//!
//! | Tier                   | Service              | Arena token          |
//! |------------------------|----------------------|----------------------|
//! | [`Tier::Extended`]     | XMS                  | locked XMS handle    |
//! | [`Tier::Upper`]        | XMS UMB / DOS link   | segment at `A000h`+  |
//! | [`Tier::Conventional`] | DOS `INT 21h/48h`    | segment below `A000h`|
//!
//! Every payload is preceded by a [`BlockHeader`]; free blocks sit on an
//! address-ordered list per arena and are coalesced on free. The
//! [`TieredAllocator`] walks the pools in a configurable [`TierOrder`]; the
//! [`DmaAllocator`] layers alignment, 64 KiB boundary and 16 MiB ceiling
//! constraints on top of it.
//!
//! ```text
//!   arena base                                              arena end
//!   ├─ header ─┼── payload ──┼─ header ─┼──── payload ────┼── … ─┤
//!              ^ 16-byte aligned
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod backing;
pub mod dma;
mod error;
pub mod header;
pub mod pool;
pub mod tiered;

pub use backing::{Arena, ArenaToken, Backing, ConventionalBacking, ExtendedBacking, UpperBacking};
pub use dma::{DmaAllocationRecord, DmaAllocator, DmaBuffer, DmaRequest};
pub use error::AllocError;
pub use header::{AllocFlags, BlockHeader, BlockKind, HEADER_SIZE, Sentinel};
pub use pool::{LeakReport, Pool, PoolStats};
pub use tiered::{Allocation, BlockAllocator, Tier, TierOrder, TierOrderError, TieredAllocator};
