//! Static configuration
//!
//! Everything can be given in a YAML file; every field has a default, so an
//! empty file (or none at all) is valid. Only the receiver host has no
//! useful default and must be set somewhere.
//!
//! ```yaml
//! receiver:
//!   host: 192.168.1.45
//!   read_timeout_secs: 300
//! display:
//!   off_attempts: 60
//!   off_interval_ms: 500
//! sources:
//!   suppress_auto_power_on: [tuner, phono, tv-audio, cd]
//! ```

use crate::avr::link::{AVR_DEFAULT_PORT, STATUS_QUERY};
use crate::avr::{Source, SourcePolicy, IOBUF_SIZE};
use crate::cec::LogicalAddress;
use crate::power::RetryPolicy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {0}: {1}")]
    Read(String, std::io::Error),
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub receiver: ReceiverConfig,
    pub display: DisplayConfig,
    pub bus: BusConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverConfig {
    /// Name or address, optionally with a port.
    pub host: String,
    pub port: u16,
    pub read_timeout_secs: u64,
    pub status_query: String,
    pub max_line: usize,
}

impl Default for ReceiverConfig {
    fn default() -> ReceiverConfig {
        ReceiverConfig {
            host: String::new(),
            port: AVR_DEFAULT_PORT,
            read_timeout_secs: 300,
            status_query: STATUS_QUERY.to_string(),
            max_line: IOBUF_SIZE,
        }
    }
}

impl ReceiverConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub address: LogicalAddress,
    pub off_attempts: u32,
    pub off_interval_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> DisplayConfig {
        let retry = RetryPolicy::default();
        DisplayConfig {
            address: LogicalAddress::Tv,
            off_attempts: retry.attempts,
            off_interval_ms: retry.interval.as_millis() as u64,
        }
    }
}

impl DisplayConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.off_attempts,
            interval: Duration::from_millis(self.off_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// Path to the `cec-client` executable.
    pub client: String,
    pub args: Vec<String>,
    /// Our own logical address.
    pub address: LogicalAddress,
}

impl Default for BusConfig {
    fn default() -> BusConfig {
        BusConfig {
            client: "cec-client".to_string(),
            // Recording device type, traffic logging on.
            args: ["-t", "r", "-d", "8", "-o", "avrcec"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            address: LogicalAddress::Recording2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    pub suppress_auto_power_on: Vec<Source>,
}

impl Default for SourcesConfig {
    fn default() -> SourcesConfig {
        SourcesConfig {
            suppress_auto_power_on: vec![
                Source::Tuner,
                Source::Phono,
                Source::TvAudio,
                Source::Cd,
                Source::Network,
                Source::Bluetooth,
            ],
        }
    }
}

impl SourcesConfig {
    pub fn policy(&self) -> SourcePolicy {
        SourcePolicy::new(self.suppress_auto_power_on.iter().copied())
    }
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Config, ConfigError> {
        // An empty document deserializes to null rather than an empty map.
        if text.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the link cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receiver.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "receiver.read_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.receiver.max_line < 2 {
            return Err(ConfigError::Invalid(
                "receiver.max_line must be at least 2".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(path.display().to_string(), err))?;
        Config::from_yaml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.receiver.port, 23);
        assert_eq!(config.receiver.read_timeout(), Duration::from_secs(300));
        assert_eq!(config.receiver.status_query, "SI?");
        assert_eq!(config.receiver.max_line, 4096);
        assert_eq!(config.display.address, LogicalAddress::Tv);
        assert_eq!(config.display.retry_policy(), RetryPolicy::default());
        assert_eq!(config.bus.address, LogicalAddress::Recording2);
        assert_eq!(config.sources.policy(), SourcePolicy::default());
    }

    #[test]
    fn partial_file() {
        let config = Config::from_yaml(
            "receiver:\n  host: avr.local\n  read_timeout_secs: 60\n\
             display:\n  off_attempts: 10\n\
             sources:\n  suppress_auto_power_on: [tuner, blu-ray]\n",
        )
        .unwrap();
        assert_eq!(config.receiver.host, "avr.local");
        assert_eq!(config.receiver.port, 23);
        assert_eq!(config.receiver.read_timeout(), Duration::from_secs(60));
        assert_eq!(config.display.retry_policy().attempts, 10);
        assert_eq!(config.display.retry_policy().interval, Duration::from_millis(500));
        let policy = config.sources.policy();
        assert!(policy.suppresses_auto_power_on(Source::BluRay));
        assert!(!policy.suppresses_auto_power_on(Source::Phono));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(Config::from_yaml("receiver:\n  hots: avr\n").is_err());
        assert!(Config::from_yaml("sources:\n  suppress_auto_power_on: [radio]\n").is_err());
    }

    #[test]
    fn rejects_unusable_link_settings() {
        assert!(matches!(
            Config::from_yaml("receiver:\n  read_timeout_secs: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_yaml("receiver:\n  max_line: 1\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(Config::from_yaml("receiver:\n  read_timeout_secs: 1\n").is_ok());
    }
}
