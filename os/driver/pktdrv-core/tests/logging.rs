use log::{LevelFilter, debug, info, trace};
use pktdrv_core::{DriverConfig, init_logging};
use pktdrv_log::LoggerInitError;

// One test: the logger is process-wide.
#[test]
fn logging_follows_the_configuration() {
    let off = DriverConfig::parse("/LOG=OFF").unwrap();
    assert!(init_logging(&off, None).unwrap().is_none());
    assert!(pktdrv_log::installed().is_none());

    let config = DriverConfig::parse("/DEBUG=2").unwrap();
    let logger = init_logging(&config, None).unwrap().unwrap();
    assert_eq!(logger.max_level(), LevelFilter::Debug);

    debug!("rx ring at 0x000D0000");
    trace!("not recorded");
    let mut out = [0u8; 4096];
    let n = logger.snapshot(&mut out);
    let text = core::str::from_utf8(&out[..n]).unwrap();
    assert!(text.contains("[DEBUG] logging: rx ring at 0x000D0000"), "{text}");
    assert!(!text.contains("not recorded"));

    assert!(matches!(
        init_logging(&config, None),
        Err(LoggerInitError::AlreadyInstalled)
    ));
    info!("still logging");
}
