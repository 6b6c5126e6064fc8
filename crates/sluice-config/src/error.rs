//! Structured errors for configuration loading and validation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while loading or validating configuration profiles.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO failure while reading a profile file.
    #[error("config io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A profile file did not contain valid JSON for the expected shape.
    #[error("config parse failure")]
    Parse {
        /// Path of the unparsable profile file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A profile field contained an invalid value.
    #[error("invalid value for '{field}': {message}")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Human-readable error description.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}
