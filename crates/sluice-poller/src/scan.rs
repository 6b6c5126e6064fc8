//! Directory listing with metadata capture.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::filter::ScanFilter;

/// One filtered directory entry with the metadata the engine needs for
/// sorting, time-window refinement, and stability checks.
#[derive(Debug, Clone)]
pub(crate) struct ScanEntry {
    pub(crate) path: PathBuf,
    pub(crate) name: String,
    pub(crate) len: u64,
    pub(crate) modified_ms: i64,
    pub(crate) is_dir: bool,
}

/// List `directory`, keeping entries the filter accepts. A missing or
/// unreadable directory is logged and treated as empty, matching the
/// retry-next-cycle posture of the engine.
pub(crate) fn list_entries(directory: &Path, filter: &dyn ScanFilter) -> Vec<ScanEntry> {
    let reader = match fs::read_dir(directory) {
        Ok(reader) => reader,
        Err(err) => {
            warn!(
                error = %err,
                directory = %directory.display(),
                "watch directory could not be listed"
            );
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for entry in reader.filter_map(Result::ok) {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !filter.accept(directory, &name) {
            continue;
        }
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        entries.push(ScanEntry {
            len: metadata.len(),
            modified_ms: metadata
                .modified()
                .map(system_time_ms)
                .unwrap_or_default(),
            is_dir: metadata.is_dir(),
            path,
            name,
        });
    }
    entries
}

/// Epoch milliseconds for a filesystem timestamp, saturating at zero for
/// pre-epoch values.
pub(crate) fn system_time_ms(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
