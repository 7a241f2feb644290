//! Structured logging setup for the console.
//!
//! `RUST_LOG` always wins; otherwise the level comes from the caller (or
//! `[logging].level` in the configuration file).

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter_or(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Human-readable output at `info` unless `RUST_LOG` says otherwise.
///
/// # Example
/// ```no_run
/// use acomms_core::logging;
///
/// logging::init();
/// tracing::info!("console started");
/// ```
pub fn init() {
    tracing_subscriber::registry()
        .with(filter_or("info"))
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// JSON lines for log shipping.
pub fn init_json() {
    tracing_subscriber::registry()
        .with(filter_or("info"))
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}

/// Install the subscriber described by the `[logging]` section.
///
/// Returns `false` if a global subscriber was already installed (tests, or
/// an embedding application that set up its own).
pub fn init_from_config(config: &LoggingConfig) -> bool {
    let filter = filter_or(&config.level);
    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
    };
    result.is_ok()
}
