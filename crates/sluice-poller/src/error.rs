//! Structured errors for the polling engine.
//!
//! # Design
//! - Only startup problems surface as errors; per-file auto-move failures are
//!   signalled to monitor callbacks so one stuck file never aborts a cycle.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for poller operations.
pub type PollerResult<T> = Result<T, PollerError>;

/// Errors produced while configuring or starting a poller.
#[derive(Debug, Error)]
pub enum PollerError {
    /// IO failure during poller setup.
    #[error("poller io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A configured watch path is not an existing directory.
    #[error("watch path {path} is not a directory")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },
    /// A required quarantine directory could not be created at startup.
    #[error("failed to create quarantine directory {path}")]
    QuarantineCreate {
        /// The quarantine directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A user filter glob pattern failed to compile.
    #[error("invalid glob pattern '{pattern}'")]
    Glob {
        /// The offending pattern.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },
}
