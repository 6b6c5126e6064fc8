//! Telemetry primitives shared across the sluice workspace.
//!
//! This crate centralises logging setup and the metrics registry so the
//! poller, pipeline, and any embedding process adopt a consistent
//! observability story.

mod error;
mod init;
mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
pub use metrics::Metrics;
