//! Tracing initialisation

use crate::config::LoggingConfig;
use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber
///
/// `RUST_LOG` takes precedence over the configured level. Returns an error if
/// a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| Error::Internal(format!("Tracing init failed: {}", e)))
}

/// Build the level filter from `RUST_LOG` or the configured level
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", config.level, e)))
}
