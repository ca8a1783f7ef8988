//! Structured logging setup
//!
//! Logs go to stderr so a stdio tool transport keeps stdout to itself.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{Result, ServiceError};

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of human readable text
    pub json_format: bool,
    /// Include file and line numbers
    pub include_source_code: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            include_source_code: true,
        }
    }
}

impl LoggingConfig {
    /// `info` in production (`ENV=prod`), `debug` everywhere else
    pub fn from_env() -> Self {
        let production = std::env::var("ENV").map(|env| env == "prod").unwrap_or(false);
        let json_format = std::env::var("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Self {
            level: if production { "info" } else { "debug" }.to_string(),
            json_format,
            ..Self::default()
        }
    }
}

/// Install the global tracing subscriber
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<()> {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let config = config.unwrap_or_else(LoggingConfig::from_env);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = if config.json_format {
        Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_file(config.include_source_code)
                    .with_line_number(config.include_source_code),
            )
            .try_init()
    } else {
        Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(config.include_source_code)
                    .with_line_number(config.include_source_code),
            )
            .try_init()
    };

    result.map_err(|e| {
        LOGGING_INITIALIZED.store(false, Ordering::SeqCst);
        ServiceError::configuration(format!("Failed to initialize logging: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_debug_text() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "debug");
        assert!(!config.json_format);
    }

    #[test]
    fn test_init_is_idempotent() {
        assert!(init_logging(Some(LoggingConfig::default())).is_ok());
        assert!(init_logging(Some(LoggingConfig::default())).is_ok());
        assert!(LOGGING_INITIALIZED.load(Ordering::SeqCst));
    }
}
