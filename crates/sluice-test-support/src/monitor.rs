//! A monitor that records everything it receives, for assertions in tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sluice_events::{DirectoryWatermark, PollEvent, PollMonitor};

/// Signalled auto-move failure captured by a [`RecordingMonitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalledFailure {
    /// A stale quarantine target could not be deleted.
    DeleteTarget {
        /// The file that could not be deleted.
        target: PathBuf,
    },
    /// A file could not be moved to its destination.
    MoveFile {
        /// Pre-move location.
        origin: PathBuf,
        /// Intended destination.
        destination: PathBuf,
    },
}

/// Monitor that appends every delivery to an in-memory log.
#[derive(Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<PollEvent>>,
    failures: Mutex<Vec<SignalledFailure>>,
}

impl RecordingMonitor {
    /// Create an empty recording monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lifecycle events received so far, in delivery order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<PollEvent> {
        self.events.lock().expect("event log mutex").clone()
    }

    /// Snapshot of the signalled failures received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn failures(&self) -> Vec<SignalledFailure> {
        self.failures.lock().expect("failure log mutex").clone()
    }

    /// Count of recorded events with the given kind discriminator.
    #[must_use]
    pub fn count_of(&self, kind: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    fn record(&self, event: PollEvent) {
        self.events.lock().expect("event log mutex").push(event);
    }
}

impl PollMonitor for RecordingMonitor {
    fn cycle_started(&self) {
        self.record(PollEvent::CycleStarted);
    }

    fn cycle_ended(&self, watermarks: &[DirectoryWatermark]) {
        self.record(PollEvent::CycleEnded {
            watermarks: watermarks.to_vec(),
        });
    }

    fn directory_lookup_started(&self, directory: &Path) {
        self.record(PollEvent::DirectoryLookupStarted {
            directory: directory.to_path_buf(),
        });
    }

    fn directory_lookup_ended(&self, directory: &Path) {
        self.record(PollEvent::DirectoryLookupEnded {
            directory: directory.to_path_buf(),
        });
    }

    fn file_set_found(&self, directory: &Path, files: &[PathBuf]) {
        self.record(PollEvent::FileSetFound {
            directory: directory.to_path_buf(),
            files: files.to_vec(),
        });
    }

    fn file_found(&self, file: &Path) {
        self.record(PollEvent::FileFound {
            file: file.to_path_buf(),
        });
    }

    fn file_moved(&self, origin: &Path, destination: &Path) {
        self.record(PollEvent::FileMoved {
            origin: origin.to_path_buf(),
            destination: destination.to_path_buf(),
        });
    }

    fn delete_target_failed(&self, target: &Path) {
        self.failures
            .lock()
            .expect("failure log mutex")
            .push(SignalledFailure::DeleteTarget {
                target: target.to_path_buf(),
            });
    }

    fn move_file_failed(&self, origin: &Path, destination: &Path) {
        self.failures
            .lock()
            .expect("failure log mutex")
            .push(SignalledFailure::MoveFile {
                origin: origin.to_path_buf(),
                destination: destination.to_path_buf(),
            });
    }
}
