//! Typed configuration surface for the sluice poller and pipeline.
#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

mod defaults;
mod error;
mod loader;
mod model;
mod normalize;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    PipelineProfile, SortKey, SortOrder, SortSpec, TimeFilterMode, WatchProfile,
};
pub use normalize::{
    DEFAULT_QUARANTINE_NAME, EffectivePipelineProfile, EffectiveWatchProfile,
    MIN_POLL_INTERVAL_MS, normalize_pipeline_profile, normalize_watch_profile,
};
