//! # Simulated DOS machine for host-side tests
//!
//! A [`SimMachine`] owns a zeroed host buffer that stands for the first
//! [`MEMORY_BYTES`] of linear memory; [`SimMapper`] points into it. The
//! service doubles hand out ranges of that buffer the way the real drivers
//! would:
//!
//! | Double            | Service               | Default window                    |
//! |-------------------|-----------------------|-----------------------------------|
//! | [`SimXms`]        | `ExtendedMemory`      | 15 MiB .. 17 MiB (straddles 16 MiB) |
//! | [`SimUmb`]        | `UpperMemory`         | `D000h` .. `E000h`                 |
//! | [`SimConventional`] | `ConventionalMemory` | `2000h` .. `A000h`                 |
//! | [`SimVds`]        | `MediatedDma`         | identity, optional remap offset   |
//!
//! Every double counts what it was asked so tests can check that locks and
//! blocks were balanced.

#![allow(unsafe_code)]

mod machine;
mod ranges;
mod services;

pub use machine::{MEMORY_BYTES, SimMachine, SimMapper};
pub use services::{SimConventional, SimUmb, SimVds, SimXms};
