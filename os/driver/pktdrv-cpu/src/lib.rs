//! # CPU capability source
//!
//! Read-only facts about the processor the driver runs on, as far as they
//! matter for keeping DMA buffers coherent with the CPU caches:
//!
//! * the processor class (an internal cache exists from the 486 on),
//! * whether `CLFLUSH` is implemented and its line size,
//! * whether `WBINVD` may be executed at the current privilege level,
//! * whether the cache is enabled at all (`CR0.CD`).
//!
//! Everything that touches the hardware sits behind the `asm` feature. The
//! decoding of raw register values is plain code, so tests construct
//! [`CpuFacts`] from synthetic CPUID output.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod class;
pub mod cpuid;
mod cr0;
mod facts;
mod ring;

pub use class::CpuClass;
pub use cpuid::{CpuVendor, CpuidRanges, CpuidResult, Leaf01h};
pub use cr0::{Cr0, ExecutionMode};
pub use facts::CpuFacts;
pub use ring::Ring;
