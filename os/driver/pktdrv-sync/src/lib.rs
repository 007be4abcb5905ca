//! # Driver synchronization primitives
//!
//! The packet driver runs on a single CPU without a scheduler; the only source
//! of concurrency is a hardware interrupt arriving between two instructions of
//! the main line. Consequently the primitives here do not spin: they mask
//! interrupts and detect re-entrance instead.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod irq_lock;
mod sync_once_cell;

pub use irq::IrqGuard;
pub use irq_lock::{IrqLock, IrqLockGuard};
pub use sync_once_cell::SyncOnceCell;
