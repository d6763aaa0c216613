//! Structured logging setup.
//!
//! Installs a `tracing` subscriber with `RUST_LOG` filtering and either
//! pretty or JSON-lines output. Everything goes to stderr.

use serde::{Deserialize, Serialize};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parse "json" or "pretty" (case-insensitive). Anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber, or report why it could not be installed.
///
/// `default_level` applies when `RUST_LOG` is unset, e.g. `"info"` or
/// `"sealchain_chain=debug,sealchain_consensus=info"`.
pub fn try_init_logging(default_level: &str, format: LogFormat) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()?,
    }

    tracing::info!(?format, "logging initialized");
    Ok(())
}

/// Install the global subscriber.
///
/// Call once, early in `main()`.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging(default_level: &str, format: LogFormat) {
    if let Err(err) = try_init_logging(default_level, format) {
        panic!("failed to initialize logging: {err}");
    }
}
