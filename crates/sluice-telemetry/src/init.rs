//! Logging initialisation.
//!
//! # Design
//! - Centralises subscriber setup (pretty or JSON) behind a single entry
//!   point so every embedder configures logging the same way.
//! - Installation is idempotent: repeated calls (common in test binaries)
//!   succeed once a subscriber from this module is in place.

use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{TelemetryError, TelemetryResult};

/// Default logging directive when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Log level directive (e.g. `info`, `sluice_poller=debug`).
    pub level: &'a str,
    /// Output format selection for the subscriber.
    pub format: LogFormat,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    /// Structured JSON objects, one per line.
    Json,
    /// Human-readable output.
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a foreign subscriber is already installed globally.
pub fn init_logging(config: &LoggingConfig<'_>) -> TelemetryResult<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(build_env_filter(config.level))
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .try_init()
            .map_err(|source| TelemetryError::Subscriber { source })?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(build_env_filter(config.level))
            .with(fmt::layer().with_target(false).with_thread_ids(false))
            .try_init()
            .map_err(|source| TelemetryError::Subscriber { source })?,
    }

    INSTALLED.set(()).ok();
    Ok(())
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
