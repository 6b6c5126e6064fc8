//! Listener interface invoked by the event dispatcher.

use std::path::{Path, PathBuf};

use crate::DirectoryWatermark;

/// Receiver for poller lifecycle events and signalled auto-move failures.
///
/// All methods have empty default implementations so monitors only override
/// what they care about. Monitors are invoked synchronously on the engine
/// task, in registration order; a monitor that blocks stalls the entire scan,
/// and a monitor that panics is isolated and logged by the dispatcher.
pub trait PollMonitor: Send + Sync {
    /// A polling cycle has begun (the poller has just woken up).
    fn cycle_started(&self) {}

    /// A polling cycle has ended (the poller is about to sleep). Receives the
    /// watermark vector recomputed during the cycle.
    fn cycle_ended(&self, watermarks: &[DirectoryWatermark]) {
        let _ = watermarks;
    }

    /// The poller is starting to look into a directory.
    fn directory_lookup_started(&self, directory: &Path) {
        let _ = directory;
    }

    /// The poller has finished looking into a directory.
    fn directory_lookup_ended(&self, directory: &Path) {
        let _ = directory;
    }

    /// A non-empty set of files matched the polling criteria. With auto-move
    /// enabled the paths point at the quarantined copies.
    fn file_set_found(&self, directory: &Path, files: &[PathBuf]) {
        let _ = (directory, files);
    }

    /// One found file, emitted only when per-file events are enabled.
    fn file_found(&self, file: &Path) {
        let _ = file;
    }

    /// A file was atomically renamed into its quarantine directory.
    fn file_moved(&self, origin: &Path, destination: &Path) {
        let _ = (origin, destination);
    }

    /// An auto-move attempt failed because a stale file already present at
    /// the destination could not be deleted.
    fn delete_target_failed(&self, target: &Path) {
        let _ = target;
    }

    /// An auto-move attempt failed because the file could not be renamed to
    /// the given destination (or its marker could not be removed afterwards).
    fn move_file_failed(&self, origin: &Path, destination: &Path) {
        let _ = (origin, destination);
    }
}
