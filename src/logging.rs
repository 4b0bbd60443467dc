//! Logging
//!
//! Structured logging through `tracing`. Output always goes to stderr so
//! stdout stays free for plans and event streams.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::DepositError;

/// Environment variable that overrides the configured filter
pub const LOG_ENV: &str = "RUST_LOG";

/// Install the global subscriber
///
/// Fails if the filter directive does not parse or a subscriber is already
/// installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), DepositError> {
    let filter = build_env_filter(config)?;
    let base_subscriber = Registry::default().with(filter);

    let result = match config.format {
        LogFormat::Json => base_subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => base_subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| DepositError::Config(format!("Failed to install logger: {}", e)))
}

/// `RUST_LOG` wins over the configured level
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, DepositError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    parse_filter(&config.level)
}

fn parse_filter(level: &str) -> Result<EnvFilter, DepositError> {
    EnvFilter::try_new(level)
        .map_err(|e| DepositError::Config(format!("Invalid log level '{}': {}", level, e)))
}
