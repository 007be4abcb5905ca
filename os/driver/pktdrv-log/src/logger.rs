use crate::ring::LogRing;
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU32, Ordering};
use log::{LevelFilter, Log, Metadata, Record};
use pktdrv_sync::{IrqLock, SyncOnceCell};

/// Console mirror for log records, called with pieces of formatted text.
pub type ConsoleSink = fn(&str);

#[derive(Debug, thiserror::Error)]
pub enum LoggerInitError {
    #[error("the ring logger is already installed")]
    AlreadyInstalled,
    #[error("another logger is already registered with the log facade")]
    FacadeTaken,
}

static LOGGER: SyncOnceCell<RingLogger> = SyncOnceCell::new();

/// The logger installed by [`RingLogger::init`], if any.
pub fn installed() -> Option<&'static RingLogger> {
    LOGGER.get()
}

pub struct RingLogger {
    max_level: LevelFilter,
    ring: IrqLock<LogRing>,
    console: Option<ConsoleSink>,
    /// Records refused because the ring was busy (logging from an ISR that
    /// interrupted another record).
    dropped: AtomicU32,
}

impl RingLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            ring: IrqLock::new(LogRing::new()),
            console: None,
            dropped: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub const fn with_console(mut self, sink: ConsoleSink) -> Self {
        self.console = Some(sink);
        self
    }

    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Call this once during driver load.
    ///
    /// # Errors
    /// Fails if a ring logger or any other `log` backend is already installed.
    pub fn init(self) -> Result<&'static Self, LoggerInitError> {
        let max_level = self.max_level;
        LOGGER
            .set(self)
            .map_err(|_| LoggerInitError::AlreadyInstalled)?;
        let logger = LOGGER.get().ok_or(LoggerInitError::AlreadyInstalled)?;
        log::set_logger(logger).map_err(|_| LoggerInitError::FacadeTaken)?;
        log::set_max_level(max_level);
        Ok(logger)
    }

    /// Appends raw text, no prefix, no filtering.
    pub fn write_raw(&self, args: fmt::Arguments) {
        if self.ring.with(|ring| ring.write_fmt(args)).is_none() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copies the newest ring contents into `out`; returns the byte count.
    pub fn snapshot(&self, out: &mut [u8]) -> usize {
        self.ring.with(|ring| ring.copy_to(out)).unwrap_or(0)
    }

    pub fn clear(&self) {
        let _ = self.ring.with(LogRing::clear);
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct ConsoleWriter(ConsoleSink);

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        (self.0)(s);
        Ok(())
    }
}

impl Log for RingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Format: "[LEVEL] target: message\n"
        let stored = self.ring.with(|ring| {
            let _ = writeln!(
                ring,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        });
        if stored.is_none() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(sink) = self.console {
            let _ = writeln!(
                ConsoleWriter(sink),
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        // the ring is the destination
    }
}
