//! Profile normalisation and guard rails.
//!
//! # Design
//! - Structural problems (no directories, overrides for uncontrolled paths)
//!   are hard errors; questionable-but-safe values are clamped and surfaced
//!   as warnings on the effective view instead.
//! - Filesystem existence is deliberately not checked here; the poller
//!   validates directories at startup, when it matters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{PipelineProfile, SortSpec, TimeFilterMode, WatchProfile};

/// Lower guard rail for the polling interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Directory name used for quarantine when no override is configured.
pub const DEFAULT_QUARANTINE_NAME: &str = "received";

/// Effective poller configuration after applying guard rails.
#[derive(Debug, Clone)]
pub struct EffectiveWatchProfile {
    /// Resolved instance name (generated when the profile omitted one).
    pub name: String,
    /// Deduplicated watch directories, in profile order.
    pub directories: Vec<PathBuf>,
    /// Quarantine overrides restricted to controlled directories.
    pub quarantine_overrides: BTreeMap<PathBuf, PathBuf>,
    /// Clamped sleep between polling cycles.
    pub poll_interval: Duration,
    /// Time-window refinement mode.
    pub time_filter: TimeFilterMode,
    /// Whether per-file events are emitted.
    pub emit_file_found: bool,
    /// Whether regular files are probed with an exclusive lock before moving.
    pub bypass_locked_files: bool,
    /// Marker deferral window.
    pub post_process_delay: Duration,
    /// Whether stable files are renamed into quarantine.
    pub auto_move: bool,
    /// Whether the first cycle is preceded by a full sleep interval.
    pub start_by_sleeping: bool,
    /// Chained candidate ordering.
    pub sort: Vec<SortSpec>,
    /// Normalised extension allowlist (lowercase, no leading dot).
    pub extensions: Vec<String>,
    /// Subdirectory names visible to plain scans.
    pub system_subdirectories: Vec<String>,
    /// Guard-rail and normalisation warnings collected along the way.
    pub warnings: Vec<String>,
}

impl EffectiveWatchProfile {
    /// Quarantine directory for a controlled directory: the configured
    /// override, or `<dir>/received`.
    #[must_use]
    pub fn quarantine_for(&self, directory: &Path) -> PathBuf {
        self.quarantine_overrides
            .get(directory)
            .cloned()
            .unwrap_or_else(|| directory.join(DEFAULT_QUARANTINE_NAME))
    }
}

/// Effective pipeline configuration after applying guard rails.
#[derive(Debug, Clone)]
pub struct EffectivePipelineProfile {
    /// Base directory for the terminal folders.
    pub base_dir: PathBuf,
    /// Worker-pool size, clamped to at least one.
    pub max_concurrent: usize,
    /// Whether successes are deleted instead of moved to `completed/`.
    pub delete_on_success: bool,
    /// Guard-rail warnings collected during normalisation.
    pub warnings: Vec<String>,
}

/// Validate a watch profile and produce its effective view.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the profile names no watch
/// directories or carries a quarantine override for a directory it does not
/// control.
pub fn normalize_watch_profile(profile: &WatchProfile) -> ConfigResult<EffectiveWatchProfile> {
    if profile.directories.is_empty() {
        return Err(ConfigError::invalid(
            "directories",
            "at least one watch directory is required",
        ));
    }

    let mut warnings = Vec::new();

    let mut directories: Vec<PathBuf> = Vec::with_capacity(profile.directories.len());
    for directory in &profile.directories {
        if directories.contains(directory) {
            warnings.push(format!(
                "duplicate watch directory {} dropped",
                directory.display()
            ));
        } else {
            directories.push(directory.clone());
        }
    }

    for overridden in profile.quarantine_overrides.keys() {
        if !directories.contains(overridden) {
            return Err(ConfigError::invalid(
                "quarantine_overrides",
                format!("{} is not a controlled directory", overridden.display()),
            ));
        }
    }

    let poll_interval_ms = if profile.poll_interval_ms < MIN_POLL_INTERVAL_MS {
        warnings.push(format!(
            "poll interval {}ms below the {MIN_POLL_INTERVAL_MS}ms floor; clamping",
            profile.poll_interval_ms
        ));
        MIN_POLL_INTERVAL_MS
    } else {
        profile.poll_interval_ms
    };

    let mut extensions = Vec::with_capacity(profile.extensions.len());
    for entry in &profile.extensions {
        let cleaned = entry.trim().trim_start_matches('.').to_lowercase();
        if cleaned.is_empty() {
            warnings.push("empty extension entry dropped".to_string());
        } else {
            extensions.push(cleaned);
        }
    }

    let name = profile
        .name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("sluice-poller-{}", Uuid::new_v4()));

    Ok(EffectiveWatchProfile {
        name,
        directories,
        quarantine_overrides: profile.quarantine_overrides.clone(),
        poll_interval: Duration::from_millis(poll_interval_ms),
        time_filter: profile.time_filter,
        emit_file_found: profile.emit_file_found,
        bypass_locked_files: profile.bypass_locked_files,
        post_process_delay: Duration::from_secs(profile.post_process_delay_minutes * 60),
        auto_move: profile.auto_move,
        start_by_sleeping: profile.start_by_sleeping,
        sort: profile.sort.clone(),
        extensions,
        system_subdirectories: profile.system_subdirectories.clone(),
        warnings,
    })
}

/// Validate a pipeline profile and produce its effective view.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the base directory is empty.
pub fn normalize_pipeline_profile(
    profile: &PipelineProfile,
) -> ConfigResult<EffectivePipelineProfile> {
    if profile.base_dir.as_os_str().is_empty() {
        return Err(ConfigError::invalid(
            "base_dir",
            "pipeline base directory cannot be empty",
        ));
    }

    let mut warnings = Vec::new();
    let max_concurrent = if profile.max_concurrent == 0 {
        warnings.push("max_concurrent 0 requested; clamping to 1".to_string());
        1
    } else {
        profile.max_concurrent
    };

    Ok(EffectivePipelineProfile {
        base_dir: profile.base_dir.clone(),
        max_concurrent,
        delete_on_success: profile.delete_on_success,
        warnings,
    })
}
