//! # Resident log ring
//!
//! A TSR has no console it may safely write to from an interrupt handler, so
//! log records are formatted into a fixed in-memory ring that a diagnostics
//! tool can read back later. Optionally each record is mirrored to a console
//! callback supplied by the host program (e.g. `INT 21h/AH=02h` while still
//! in the foreground during load).
//!
//! ```text
//! log::info!(...)
//!     ↓
//! RingLogger (log::Log)
//!     ├─→ LogRing (IrqLock, 8 KiB, oldest bytes overwritten)
//!     └─→ ConsoleSink (optional, outside the lock)
//! ```
//!
//! Recording never allocates. If an interrupt handler logs while the main
//! line is in the middle of writing a record, the handler's record is dropped
//! and counted instead of corrupting the ring.
//!
//! ```rust,no_run
//! use pktdrv_log::RingLogger;
//! use log::{LevelFilter, info};
//!
//! RingLogger::new(LevelFilter::Info).init().expect("logger initialization");
//! info!("packet driver loaded");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod logger;
mod ring;

pub use logger::{ConsoleSink, LoggerInitError, RingLogger, installed};
pub use ring::{LOG_RING_BYTES, LogRing};

#[doc(hidden)]
pub mod ring_fmt {
    use core::fmt;

    #[doc(hidden)]
    pub fn ring_write(args: fmt::Arguments) {
        if let Some(logger) = crate::installed() {
            logger.write_raw(args);
        }
    }
}

/// Writes raw formatted text into the installed ring, bypassing level
/// filtering and the `[LEVEL] target:` prefix.
#[macro_export]
macro_rules! ring_trace {
    ($($arg:tt)*) => {{
        $crate::ring_fmt::ring_write(core::format_args!($($arg)*));
    }};
}
