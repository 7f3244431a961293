//! Process-wide `tracing` subscriber for the binary.
//!
//! The library itself never installs a subscriber; transports log through
//! their [`TransportObserver`](crate::transport::TransportObserver).

use crate::config::{ConfigError, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins, then `level_override`, then the
/// configured level.
pub fn env_filter(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = level_override.unwrap_or(&config.level);
    EnvFilter::try_new(directive)
        .map_err(|e| ConfigError::invalid("logging.level", e))
}

/// Install a stderr subscriber in the configured format.
///
/// A subscriber that is already installed is left in place.
pub fn init_logging(
    config: &LoggingConfig,
    format_override: Option<LogFormat>,
    level_override: Option<&str>,
) -> Result<(), ConfigError> {
    let filter = env_filter(config, level_override)?;
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false);

    let _ = match format_override.unwrap_or(config.format) {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    Ok(())
}
