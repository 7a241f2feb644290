//! Shared foundations for the acoustic command console.
//!
//! This crate holds the pieces every other member needs: the configuration
//! model, the core error type, logging initialisation and a few plain types.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{
    ConsoleConfig, CorrelatorConfig, DiscoveryConfig, GatewayConfig, LoggingConfig,
    NetworkConfig, RangesConfig, DEFAULT_DISCOVERY_PERIOD, DEFAULT_INTER_SEND_DELAY,
    DEFAULT_RANGE_CAPACITY, MAX_FRAGMENT_SIZE, RELAY_SERVICE,
};
pub use error::{CoreError, Result};
pub use types::{now_ns, Coordinate};
