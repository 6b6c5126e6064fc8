//! Polling ingestion engine for directories fed by external writers.
//!
//! A [`DirectoryPoller`] repeatedly scans a set of controlled directories,
//! decides when an arrived file is safe to touch (its size must be unchanged
//! across two consecutive cycles, and any post-process marker delay must have
//! elapsed), renames it atomically into a per-directory quarantine, and
//! reports everything it does to registered
//! [`PollMonitor`](sluice_events::PollMonitor)s.
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

mod automove;
mod engine;
mod error;
mod filter;
mod marker;
mod scan;
mod sort;
mod stability;

pub use engine::{DirectoryPoller, PollerHandle};
pub use error::{PollerError, PollerResult};
pub use filter::{AcceptAll, ExtensionFilter, GlobFilter, ScanFilter};
pub use marker::{MarkerAction, MarkerProtocol};
pub use stability::{Stability, StabilityTracker};
