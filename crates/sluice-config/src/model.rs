//! Typed configuration models.
//!
//! # Design
//! - Pure data carriers deserialised from profile documents.
//! - Normalisation and guard rails live in `normalize`, not here.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Configuration for one poller instance and its controlled directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchProfile {
    /// Optional instance name; a unique one is generated when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Directories under watch.
    pub directories: Vec<PathBuf>,
    /// Per-directory quarantine overrides, keyed by watch directory. A
    /// directory without an override quarantines into `<dir>/received`.
    #[serde(default)]
    pub quarantine_overrides: BTreeMap<PathBuf, PathBuf>,
    /// Sleep between polling cycles, in milliseconds.
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Time-window refinement applied on top of the scan filter.
    #[serde(default)]
    pub time_filter: TimeFilterMode,
    /// Emit one `FileFound` event per found file in addition to the set event.
    #[serde(default)]
    pub emit_file_found: bool,
    /// Probe regular files with a non-blocking exclusive lock before moving;
    /// files still held by a writer are silently deferred.
    #[serde(default)]
    pub bypass_locked_files: bool,
    /// Deferral window, in minutes, for post-process markers. Zero disables
    /// marker-based deferral entirely.
    #[serde(default)]
    pub post_process_delay_minutes: u64,
    /// Atomically rename stable files into the quarantine directory.
    #[serde(default)]
    pub auto_move: bool,
    /// Sleep for one interval before the first cycle instead of scanning
    /// immediately on startup.
    #[serde(default)]
    pub start_by_sleeping: bool,
    /// Ordering applied to each directory's candidate list before the
    /// auto-move pass. Empty means directory-listing order.
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    /// File-extension allowlist (case-insensitive, without the leading dot).
    /// Empty accepts every extension.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Subdirectory names that remain visible to plain scans; all other
    /// subdirectories are skipped.
    #[serde(default)]
    pub system_subdirectories: Vec<String>,
}

/// Time-window refinement modes for directory scans.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TimeFilterMode {
    /// No time-based filtering.
    #[default]
    Off,
    /// Accept files modified after the previous cycle's scan start time.
    PollingTime,
    /// Accept files modified after the highest modification time seen in the
    /// previous cycle.
    ModificationTime,
}

impl TimeFilterMode {
    /// Render the mode as its canonical configuration string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::PollingTime => "polling-time",
            Self::ModificationTime => "modification-time",
        }
    }
}

/// Closed set of fields candidate lists can be ordered by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Lexicographic file name.
    Name,
    /// File length in bytes.
    Size,
    /// Modification time.
    Modified,
}

/// Direction applied to one sort key.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// One element of a chained ordering: a sortable field plus a direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to compare.
    pub key: SortKey,
    /// Direction for this field.
    #[serde(default)]
    pub order: SortOrder,
}

/// Configuration for the concurrent processing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineProfile {
    /// Base directory the `working/`, `completed/`, and `failed/` folders are
    /// created under.
    pub base_dir: PathBuf,
    /// Upper bound on concurrently processing tasks.
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
    /// Delete successfully processed files instead of moving them into
    /// `completed/`.
    #[serde(default)]
    pub delete_on_success: bool,
}
