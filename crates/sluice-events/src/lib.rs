//! Lifecycle event model for the sluice poller.
//!
//! The poller describes everything it does as a small, fixed set of typed
//! events. Each emission is wrapped in an [`EventEnvelope`] carrying a
//! sequential identifier, a UTC timestamp, and the name of the originating
//! poller, then delivered synchronously to registered [`PollMonitor`]s in
//! registration order by the [`EventDispatcher`]. Move/delete failures during
//! auto-move travel on a separate signal path with dedicated callbacks rather
//! than through the lifecycle events.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod dispatch;
mod monitor;

pub use dispatch::EventDispatcher;
pub use monitor::PollMonitor;

/// Identifier assigned to each event emitted by a poller instance.
pub type EventId = u64;

/// Per-directory watermark snapshot reported at the end of a cycle.
///
/// `base_time_ms` is the epoch-millisecond bound used by time-window
/// filtering; files modified at or before it are ignored on the next lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryWatermark {
    /// Controlled directory the watermark belongs to.
    pub directory: PathBuf,
    /// Epoch milliseconds of the watermark; zero until first updated.
    pub base_time_ms: i64,
}

/// Typed lifecycle events emitted by the poll-cycle engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollEvent {
    /// A polling cycle has begun.
    CycleStarted,
    /// A polling cycle has finished; carries the updated watermark vector.
    CycleEnded {
        /// Watermarks recomputed during the cycle, one per directory.
        watermarks: Vec<DirectoryWatermark>,
    },
    /// The poller is about to scan a controlled directory.
    DirectoryLookupStarted {
        /// Directory being scanned.
        directory: PathBuf,
    },
    /// The poller has finished scanning a controlled directory.
    DirectoryLookupEnded {
        /// Directory that was scanned.
        directory: PathBuf,
    },
    /// A non-empty set of files matched the polling criteria.
    ///
    /// When auto-move is active the paths point into the quarantine
    /// directory, i.e. at the files' post-handoff locations.
    FileSetFound {
        /// Directory the set belongs to (quarantine when auto-move is on).
        directory: PathBuf,
        /// Files found during this lookup.
        files: Vec<PathBuf>,
    },
    /// One file out of a found set, emitted only when per-file events are
    /// enabled in the profile.
    FileFound {
        /// The found file.
        file: PathBuf,
    },
    /// A file was renamed into its quarantine directory by the auto-mover.
    FileMoved {
        /// Pre-move location.
        origin: PathBuf,
        /// Post-move location inside the quarantine directory.
        destination: PathBuf,
    },
}

impl PollEvent {
    /// Machine-friendly discriminator, used for logging and metrics labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PollEvent::CycleStarted => "cycle_started",
            PollEvent::CycleEnded { .. } => "cycle_ended",
            PollEvent::DirectoryLookupStarted { .. } => "directory_lookup_started",
            PollEvent::DirectoryLookupEnded { .. } => "directory_lookup_ended",
            PollEvent::FileSetFound { .. } => "file_set_found",
            PollEvent::FileFound { .. } => "file_found",
            PollEvent::FileMoved { .. } => "file_moved",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id, the
/// emission timestamp, and the poller that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier within the owning dispatcher.
    pub id: EventId,
    /// UTC instant the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Name of the poller instance that produced the event.
    pub poller: String,
    /// The lifecycle event itself.
    pub event: PollEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_covers_every_variant() {
        let events = [
            PollEvent::CycleStarted,
            PollEvent::CycleEnded { watermarks: vec![] },
            PollEvent::DirectoryLookupStarted {
                directory: PathBuf::from("/watch"),
            },
            PollEvent::DirectoryLookupEnded {
                directory: PathBuf::from("/watch"),
            },
            PollEvent::FileSetFound {
                directory: PathBuf::from("/watch/received"),
                files: vec![PathBuf::from("/watch/received/a.txt")],
            },
            PollEvent::FileFound {
                file: PathBuf::from("/watch/received/a.txt"),
            },
            PollEvent::FileMoved {
                origin: PathBuf::from("/watch/a.txt"),
                destination: PathBuf::from("/watch/received/a.txt"),
            },
        ];
        let kinds: Vec<_> = events.iter().map(PollEvent::kind).collect();
        assert_eq!(
            kinds,
            [
                "cycle_started",
                "cycle_ended",
                "directory_lookup_started",
                "directory_lookup_ended",
                "file_set_found",
                "file_found",
                "file_moved",
            ]
        );
    }

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = PollEvent::FileMoved {
            origin: PathBuf::from("/watch/a.txt"),
            destination: PathBuf::from("/watch/received/a.txt"),
        };
        let value = serde_json::to_value(&event).expect("serializable event");
        assert_eq!(value["type"], "file_moved");
        assert_eq!(value["origin"], "/watch/a.txt");
    }
}
