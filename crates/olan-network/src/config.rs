//! Bridge configuration.

use std::time::Duration;

use olan_common::{OlanError, OlanResult};
use serde::{Deserialize, Serialize};

use crate::frame::ETHERNET_HEADER_LEN;

/// Default learning entry timeout (seconds).
pub const DEFAULT_TIMEOUT: u64 = 5 * 60;

/// Default aging sweep interval (seconds).
pub const DEFAULT_EXPIRE_INTERVAL: u64 = 5;

/// Default bridge MTU, sized for a full tagged Ethernet frame.
pub const DEFAULT_MTU: usize = 1518;

/// Virtual bridge configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bridge name.
    pub name: String,
    /// Receive buffer size per slave, in bytes.
    pub mtu: usize,
    /// Learning entry idle timeout (seconds).
    pub timeout: u64,
    /// Interval between aging sweeps (seconds).
    pub expire_interval: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: "olan0".to_string(),
            mtu: DEFAULT_MTU,
            timeout: DEFAULT_TIMEOUT,
            expire_interval: DEFAULT_EXPIRE_INTERVAL,
        }
    }
}

impl BridgeConfig {
    /// Create a configuration for bridge `name` with default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the MTU.
    #[must_use]
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the learning timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Set the aging sweep interval.
    #[must_use]
    pub fn with_expire_interval(mut self, seconds: u64) -> Self {
        self.expire_interval = seconds;
        self
    }

    /// Aging sweep interval as a [`Duration`].
    #[must_use]
    pub const fn expire_period(&self) -> Duration {
        Duration::from_secs(self.expire_interval)
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, the MTU cannot hold an
    /// Ethernet header, or the sweep interval is zero.
    pub fn validate(&self) -> OlanResult<()> {
        if self.name.is_empty() {
            return Err(OlanError::Config {
                message: "bridge name must not be empty".to_string(),
            });
        }
        if self.mtu < ETHERNET_HEADER_LEN {
            return Err(OlanError::Config {
                message: format!(
                    "mtu {} is smaller than an Ethernet header ({ETHERNET_HEADER_LEN} bytes)",
                    self.mtu
                ),
            });
        }
        if self.expire_interval == 0 {
            return Err(OlanError::Config {
                message: "expire_interval must be at least one second".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.mtu, 1518);
        assert_eq!(config.timeout, 300);
        assert_eq!(config.expire_period(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = BridgeConfig::new("br-test")
            .with_mtu(9000)
            .with_timeout(60)
            .with_expire_interval(1);

        assert_eq!(config.name, "br-test");
        assert_eq!(config.mtu, 9000);
        assert_eq!(config.timeout, 60);
        assert_eq!(config.expire_interval, 1);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: BridgeConfig = serde_json::from_str(r#"{"name": "br1", "timeout": 120}"#).unwrap();
        assert_eq!(config.name, "br1");
        assert_eq!(config.timeout, 120);
        assert_eq!(config.mtu, DEFAULT_MTU);
        assert_eq!(config.expire_interval, DEFAULT_EXPIRE_INTERVAL);
    }

    #[test]
    fn invalid_configs() {
        assert!(BridgeConfig::new("").validate().is_err());
        assert!(BridgeConfig::new("br0").with_mtu(10).validate().is_err());
        assert!(
            BridgeConfig::new("br0")
                .with_expire_interval(0)
                .validate()
                .is_err()
        );
    }
}
