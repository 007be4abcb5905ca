use crate::DriverConfig;
use log::{LevelFilter, info};
use pktdrv_log::{ConsoleSink, LoggerInitError, RingLogger};

/// Installs the resident log ring at the level `DEBUG=` asks for.
///
/// Returns `Ok(None)` without installing anything when `LOG=OFF`.
///
/// # Errors
/// When a logger is already installed.
pub fn init_logging(
    config: &DriverConfig,
    console: Option<ConsoleSink>,
) -> Result<Option<&'static RingLogger>, LoggerInitError> {
    let level = config.log_level();
    if level == LevelFilter::Off {
        return Ok(None);
    }
    let logger = match console {
        Some(sink) => RingLogger::new(level).with_console(sink),
        None => RingLogger::new(level),
    };
    let logger = logger.init()?;
    info!("Logging at {level}");
    Ok(Some(logger))
}
