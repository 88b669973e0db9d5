//! Structured logging setup built on `tracing-subscriber`.
//!
//! `RUST_LOG` takes precedence over the configured level so operators can turn on
//! per-module debugging without touching the config file.

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ProtocolError::ConfigError(format!("Failed to install logger: {e}")))
}
