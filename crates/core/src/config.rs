//! Configuration management for the acoustic console.
//!
//! Configuration is read from a TOML file. Every section has defaults, so a
//! file only needs to name the values it changes:
//!
//! ```toml
//! [network]
//! console_name = "ccu-lab"
//! listen_addr = "0.0.0.0:6002"
//!
//! [network.relay_endpoints]
//! manta-1 = "10.0.10.91:6002"
//!
//! [gateway]
//! inter_send_delay_ms = 2000
//!
//! [discovery]
//! seed_systems = ["lauv-xplore-1", "lauv-noptilus-2"]
//!
//! [ranges]
//! capacity = 5000
//! ```

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Largest payload slice one acoustic frame can carry, in bytes
pub const MAX_FRAGMENT_SIZE: usize = 1020;

/// Service name advertised by systems able to relay acoustic operations
pub const RELAY_SERVICE: &str = "acoustic/operation";

/// Default time between discovery rounds
pub const DEFAULT_DISCOVERY_PERIOD: Duration = Duration::from_secs(300);

/// Default separation between sends to different gateways
pub const DEFAULT_INTER_SEND_DELAY: Duration = Duration::from_secs(2);

/// Default number of range samples kept before the oldest are dropped
pub const DEFAULT_RANGE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub network: NetworkConfig,
    pub gateway: GatewayConfig,
    pub discovery: DiscoveryConfig,
    pub correlator: CorrelatorConfig,
    pub ranges: RangesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Name this console uses as the origin of text commands
    pub console_name: String,
    /// Local UDP address for inbound notifications
    pub listen_addr: String,
    /// Relay name to UDP endpoint
    pub relay_endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub relay_service: String,
    /// Only resolve gateways currently marked active
    pub active_only: bool,
    /// Space out ranging requests when more than one gateway is used
    pub separate_ranging: bool,
    pub inter_send_delay_ms: u64,
    pub max_fragment_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub period_secs: u64,
    /// Systems known before any discovery reply arrives
    pub seed_systems: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Age after which a live operation is timed out by the sweep
    pub operation_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangesConfig {
    /// Samples kept in the range log, oldest evicted first
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            console_name: "acomms-console".to_string(),
            listen_addr: "0.0.0.0:6002".to_string(),
            relay_endpoints: BTreeMap::new(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            relay_service: RELAY_SERVICE.to_string(),
            active_only: true,
            separate_ranging: true,
            inter_send_delay_ms: DEFAULT_INTER_SEND_DELAY.as_millis() as u64,
            max_fragment_size: MAX_FRAGMENT_SIZE,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_secs: DEFAULT_DISCOVERY_PERIOD.as_secs(),
            seed_systems: Vec::new(),
        }
    }
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: 600,
            sweep_interval_secs: 15,
        }
    }
}

impl Default for RangesConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_RANGE_CAPACITY,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl GatewayConfig {
    pub fn inter_send_delay(&self) -> Duration {
        Duration::from_millis(self.inter_send_delay_ms)
    }
}

impl DiscoveryConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl CorrelatorConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl ConsoleConfig {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ConsoleConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    /// Reject values the router cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.gateway.max_fragment_size == 0 {
            return Err(CoreError::Config(
                "gateway.max_fragment_size must be greater than zero".to_string(),
            ));
        }
        if self.gateway.relay_service.trim().is_empty() {
            return Err(CoreError::Config(
                "gateway.relay_service must not be empty".to_string(),
            ));
        }
        if self.discovery.enabled && self.discovery.period_secs == 0 {
            return Err(CoreError::Config(
                "discovery.period_secs must be greater than zero when discovery is enabled"
                    .to_string(),
            ));
        }
        if self.correlator.sweep_interval_secs == 0 {
            return Err(CoreError::Config(
                "correlator.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.correlator.operation_timeout_secs == 0 {
            return Err(CoreError::Config(
                "correlator.operation_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.ranges.capacity == 0 {
            return Err(CoreError::Config(
                "ranges.capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
