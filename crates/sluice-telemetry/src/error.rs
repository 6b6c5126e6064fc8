//! Structured errors for telemetry setup and exposition.

use thiserror::Error;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors produced while configuring logging or metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The global tracing subscriber could not be installed.
    #[error("failed to install tracing subscriber")]
    Subscriber {
        /// Underlying subscriber initialisation error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// A Prometheus collector could not be created or registered.
    #[error("failed to register metrics collector")]
    Prometheus {
        /// Underlying prometheus error.
        #[from]
        source: prometheus::Error,
    },
    /// The encoded metrics buffer was not valid UTF-8.
    #[error("metrics output was not valid UTF-8")]
    Exposition {
        /// Underlying conversion error.
        source: std::string::FromUtf8Error,
    },
}
