//! Subscriber setup for binaries.
//!
//! Library code logs through the `log` facade and opens `tracing` spans;
//! [`init_tracing`] routes both into one `tracing-subscriber` pipeline.

use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::error::ConfigError;

pub const DEFAULT_FILTER: &str = "info,reportflow=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidSetting {
                name: "LOG_FORMAT",
                value: other.to_string(),
                reason: "expected 'pretty' or 'json'".to_string(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("A global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge `log` records: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),
}

/// Builds the filter from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Logs go to stderr so stdout stays free
/// for command output.
pub fn init_tracing(format: LogFormat) -> Result<(), LoggingError> {
    let registry = Registry::default().with(env_filter());

    match format {
        LogFormat::Pretty => {
            let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(std::io::stderr);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
    }

    tracing_log::LogTracer::init()?;
    Ok(())
}
