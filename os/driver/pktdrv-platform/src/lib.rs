//! # DOS platform services and capability detection
//!
//! Everything the memory core needs to know about, or ask of, the host
//! environment:
//!
//! * [`collect_facts`] gathers an immutable [`CapabilityFacts`] snapshot: is a
//!   Virtual DMA Services provider loaded, is any paging/V86 memory manager
//!   active, is an XMS driver present, what can the CPU do.
//! * The service traits in [`services`] ([`ExtendedMemory`], [`UpperMemory`],
//!   [`ConventionalMemory`], [`MediatedDma`]) are the only way the allocator
//!   obtains or pins memory.
//! * [`RealModeServices`] is the seam below both: software interrupts and far
//!   calls into real-mode drivers. The `asm` feature provides a DPMI-backed
//!   implementation; tests script it.
//!
//! ```text
//!  collect_facts() ──→ Environment ──→ BiosEnvironment ─┐
//!                                                       ├──→ RealModeServices (INT / far call)
//!  allocator ──→ XmsDriver / DosMemory / VdsDriver ─────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod detect;
#[cfg(all(feature = "asm", target_arch = "x86"))]
pub mod dpmi;
pub mod dos;
mod facts;
mod mapper;
mod capabilities;
mod regs;
pub mod services;
pub mod vds;
pub mod xms;

pub use facts::{CapabilityFacts, DosVersion, PagingManagers};
pub use mapper::{IdentityMapper, PhysMapper};
pub use capabilities::{BiosEnvironment, Environment, collect_facts};
pub use regs::{RealModeServices, Regs};
pub use services::{
    ConventionalMemory, ExtendedMemory, MediatedDma, PhysicalDescriptor, ServiceError,
    UpperMemory, VdsStatus, XmsHandle, XmsInfo,
};
