//! Driver parameters from the `CONFIG.SYS` / command line tail.
//!
//! Tokens are separated by blanks. Each is `KEY=VALUE` or a bare `KEY`
//! (which reads as `KEY=1`), optionally prefixed by `/`; keys and keyword
//! values are case-insensitive:
//!
//! | Key         | Values                 | Default |
//! |-------------|------------------------|---------|
//! | `XMS`       | `0`, `1`               | `1`     |
//! | `UMB`       | `0`, `1`               | `1`     |
//! | `TIER`      | letters of `X`, `U`, `C` | `XUC` |
//! | `BUSMASTER` | `ON`, `OFF`, `AUTO`    | `AUTO`  |
//! | `PIO`       | `ON`, `OFF`, `1`, `0`  | off     |
//! | `DMARETRY`  | `1..=10`               | `5`     |
//! | `DMAALIGN`  | power of two, `16..=4096` | `16` |
//! | `DMAMIN`    | bytes, at least 1      | `256`   |
//! | `DEBUG`     | `0..=3`                | `1`     |
//! | `LOG`       | `ON`, `OFF`            | `ON`    |
//!
//! Keys the memory core does not know (NIC settings such as `IO1=`) are
//! skipped with a warning.

use log::{LevelFilter, info, warn};
use pktdrv_alloc::{Tier, TierOrder, TierOrderError};
use pktdrv_alloc::dma::MAX_DMA_RETRIES;
use pktdrv_dma::BusMasterOverride;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError<'a> {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: &'a str },
    #[error("TIER: {0}")]
    TierOrder(#[from] TierOrderError),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DriverConfig {
    pub use_xms: bool,
    pub use_umb: bool,
    pub tier_order: TierOrder,
    pub bus_master: BusMasterOverride,
    pub force_pio: bool,
    pub dma_retries: u8,
    pub dma_alignment: u32,
    /// Smallest DMA buffer the degrade path may settle for.
    pub dma_min_size: u32,
    pub debug_level: u8,
    pub logging: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            use_xms: true,
            use_umb: true,
            tier_order: TierOrder::default(),
            bus_master: BusMasterOverride::Auto,
            force_pio: false,
            dma_retries: 5,
            dma_alignment: 16,
            dma_min_size: 256,
            debug_level: 1,
            logging: true,
        }
    }
}

fn flag<'a>(key: &'static str, value: &'a str) -> Result<bool, ConfigError<'a>> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        v if v.eq_ignore_ascii_case("ON") => Ok(true),
        v if v.eq_ignore_ascii_case("OFF") => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}

fn number<'a>(key: &'static str, value: &'a str, lo: u32, hi: u32) -> Result<u32, ConfigError<'a>> {
    value
        .parse::<u32>()
        .ok()
        .filter(|n| (lo..=hi).contains(n))
        .ok_or(ConfigError::InvalidValue { key, value })
}

impl DriverConfig {
    /// Parses a parameter string on top of the defaults.
    ///
    /// # Errors
    /// The first known key with a value it does not accept.
    pub fn parse(params: &str) -> Result<Self, ConfigError<'_>> {
        let mut config = Self::default();
        for token in params.split_ascii_whitespace() {
            let token = token.strip_prefix('/').unwrap_or(token);
            let (key, value) = token.split_once('=').unwrap_or((token, "1"));
            config.apply(key, value)?;
        }
        Ok(config)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn apply<'a>(&mut self, key: &str, value: &'a str) -> Result<(), ConfigError<'a>> {
        let is = |name: &str| key.eq_ignore_ascii_case(name);
        if is("XMS") {
            self.use_xms = flag("XMS", value)?;
        } else if is("UMB") {
            self.use_umb = flag("UMB", value)?;
        } else if is("TIER") {
            self.tier_order = TierOrder::parse(value)?;
        } else if is("BUSMASTER") {
            self.bus_master = match value {
                v if v.eq_ignore_ascii_case("ON") => BusMasterOverride::On,
                v if v.eq_ignore_ascii_case("OFF") => BusMasterOverride::Off,
                v if v.eq_ignore_ascii_case("AUTO") => BusMasterOverride::Auto,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "BUSMASTER",
                        value,
                    });
                }
            };
        } else if is("PIO") {
            self.force_pio = flag("PIO", value)?;
            if self.force_pio {
                info!("Forcing PIO mode (bus master disabled)");
            }
        } else if is("DMARETRY") {
            self.dma_retries = number("DMARETRY", value, 1, u32::from(MAX_DMA_RETRIES))? as u8;
        } else if is("DMAALIGN") {
            let align = number("DMAALIGN", value, 16, 4096)?;
            if !align.is_power_of_two() {
                return Err(ConfigError::InvalidValue {
                    key: "DMAALIGN",
                    value,
                });
            }
            self.dma_alignment = align;
        } else if is("DMAMIN") {
            self.dma_min_size = number("DMAMIN", value, 1, 0x1_0000)?;
        } else if is("DEBUG") {
            self.debug_level = number("DEBUG", value, 0, 3)? as u8;
        } else if is("LOG") {
            self.logging = flag("LOG", value)?;
        } else {
            warn!("Unknown configuration parameter: {key}");
        }
        Ok(())
    }

    /// The configured tier order minus the tiers switched off by `XMS=0` and
    /// `UMB=0`.
    #[must_use]
    pub fn effective_order(&self) -> TierOrder {
        let mut order = self.tier_order;
        if !self.use_xms {
            order = order.without(Tier::Extended);
        }
        if !self.use_umb {
            order = order.without(Tier::Upper);
        }
        order
    }

    /// Bus master setting with `PIO` folded in.
    #[must_use]
    pub const fn bus_master_override(&self) -> BusMasterOverride {
        if self.force_pio {
            BusMasterOverride::Off
        } else {
            self.bus_master
        }
    }

    /// Log filter for `DEBUG=` and `LOG=`.
    #[must_use]
    pub const fn log_level(&self) -> LevelFilter {
        if !self.logging {
            return LevelFilter::Off;
        }
        match self.debug_level {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_gives_defaults() {
        assert_eq!(DriverConfig::parse("").unwrap(), DriverConfig::default());
        assert_eq!(DriverConfig::parse("   ").unwrap(), DriverConfig::default());
    }

    #[test]
    fn typical_line() {
        let c = DriverConfig::parse("/IO1=0x300 /xms=0 /BusMaster=off /DMARETRY=8 /debug=2")
            .unwrap();
        assert!(!c.use_xms);
        assert_eq!(c.bus_master, BusMasterOverride::Off);
        assert_eq!(c.dma_retries, 8);
        assert_eq!(c.log_level(), LevelFilter::Debug);
        assert_eq!(c.effective_order().to_string(), "UC");
    }

    #[test]
    fn bare_keys_are_flags() {
        let c = DriverConfig::parse("PIO /UMB=0").unwrap();
        assert!(c.force_pio);
        assert_eq!(c.bus_master_override(), BusMasterOverride::Off);
        assert_eq!(c.effective_order().to_string(), "XC");
    }

    #[test]
    fn tier_order_and_alignment() {
        let c = DriverConfig::parse("/TIER=cux /DMAALIGN=64 /DMAMIN=512").unwrap();
        assert_eq!(c.tier_order.to_string(), "CUX");
        assert_eq!(c.dma_alignment, 64);
        assert_eq!(c.dma_min_size, 512);
    }

    #[test]
    fn bad_values_name_the_key() {
        assert_eq!(
            DriverConfig::parse("/DEBUG=7"),
            Err(ConfigError::InvalidValue {
                key: "DEBUG",
                value: "7"
            })
        );
        assert_eq!(
            DriverConfig::parse("/DMAALIGN=48"),
            Err(ConfigError::InvalidValue {
                key: "DMAALIGN",
                value: "48"
            })
        );
        assert_eq!(
            DriverConfig::parse("/DMARETRY=11"),
            Err(ConfigError::InvalidValue {
                key: "DMARETRY",
                value: "11"
            })
        );
        assert_eq!(
            DriverConfig::parse("/BUSMASTER=MAYBE"),
            Err(ConfigError::InvalidValue {
                key: "BUSMASTER",
                value: "MAYBE"
            })
        );
        assert_eq!(
            DriverConfig::parse("/TIER=XX"),
            Err(ConfigError::TierOrder(TierOrderError::Duplicate(Tier::Extended)))
        );
    }

    #[test]
    fn logging_off_silences_everything() {
        let c = DriverConfig::parse("/LOG=OFF /DEBUG=3").unwrap();
        assert_eq!(c.log_level(), LevelFilter::Off);
    }
}
