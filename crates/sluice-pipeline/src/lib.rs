//! Bounded concurrent processing pipeline for received files.
//!
//! The pipeline is a [`PollMonitor`](sluice_events::PollMonitor): registered
//! with a poller, it takes every found file through a private `working/`
//! directory, a user-supplied [`FileProcessor`], and finally into
//! `completed/` or `failed/` (with a `<name>.log` failure report). Worker
//! concurrency is bounded by the profile; terminal-folder bookkeeping is
//! owned by a single drainer task so workers never block on it.
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

mod pipeline;
mod processor;

pub use pipeline::ProcessingPipeline;
pub use processor::FileProcessor;
