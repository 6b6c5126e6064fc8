//! Post-process marker sidecar files.
//!
//! A marker named `.~<name>~` defers an action on its already-quarantined
//! subject `<name>`: an external agent writes `action=delete` or
//! `action=move` + `dest=<path>` as `key=value` lines, and the poller applies
//! the action once the marker has sat unmodified for the configured delay.
//! Markers also gate the auto-mover: a file whose marker delay has not yet
//! elapsed is left alone for the cycle.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

const MARKER_PREFIX: &str = ".~";
const MARKER_SUFFIX: &str = "~";

/// Whether `name` has the `.~<subject>~` marker shape.
pub(crate) fn is_marker_name(name: &str) -> bool {
    name.len() > MARKER_PREFIX.len() + MARKER_SUFFIX.len()
        && name.starts_with(MARKER_PREFIX)
        && name.ends_with(MARKER_SUFFIX)
}

/// Deferred action encoded in a marker file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerAction {
    /// Delete the subject file.
    Delete,
    /// Move the subject file to the given absolute destination.
    Move(PathBuf),
}

impl MarkerAction {
    /// Interpret parsed marker entries. Returns `None` when the `action` key
    /// is missing or unrecognised, or when `action=move` lacks a `dest`.
    #[must_use]
    pub fn from_entries(entries: &BTreeMap<String, String>) -> Option<Self> {
        match entries.get("action").map(String::as_str) {
            Some("delete") => Some(Self::Delete),
            Some("move") => entries
                .get("dest")
                .map(|dest| Self::Move(PathBuf::from(dest))),
            _ => None,
        }
    }
}

/// Reader/executor for post-process markers under a configured delay.
#[derive(Debug, Clone)]
pub struct MarkerProtocol {
    delay: Duration,
}

impl MarkerProtocol {
    /// Create a protocol instance. A zero `delay` disables deferral: no
    /// marker is ever pending and none is ever actionable.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Path of the marker belonging to `file` (beside it, `.~<name>~`).
    #[must_use]
    pub fn marker_path_for(file: &Path) -> PathBuf {
        let name = file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        file.with_file_name(format!("{MARKER_PREFIX}{name}{MARKER_SUFFIX}"))
    }

    /// Whether the marker file is actionable: the delay is configured, the
    /// marker is a non-empty readable file, and it has sat unmodified for at
    /// least the delay.
    #[must_use]
    pub fn is_expired(&self, marker: &Path) -> bool {
        self.marker_age(marker)
            .is_some_and(|age| age >= self.delay)
    }

    /// Whether an auto-move of `file` must be deferred this cycle: its marker
    /// exists and the delay has not yet elapsed.
    #[must_use]
    pub fn delay_pending(&self, file: &Path) -> bool {
        let marker = Self::marker_path_for(file);
        self.marker_age(&marker)
            .is_some_and(|age| age < self.delay)
    }

    /// Parse a marker file into its `key=value` entries. Lines without a
    /// `=` separator are skipped, not errors.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error when the marker cannot be read.
    pub fn read(marker: &Path) -> io::Result<BTreeMap<String, String>> {
        let raw = fs::read_to_string(marker)?;
        let mut entries = BTreeMap::new();
        for line in raw.lines() {
            if let Some((key, value)) = line.split_once('=') {
                entries.insert(key.to_string(), value.to_string());
            }
        }
        Ok(entries)
    }

    /// Remove the marker belonging to `file`.
    ///
    /// Returns `true` when the marker is absent or was deleted — calling this
    /// twice in a row reports success both times — and `false` only when the
    /// deletion itself failed.
    #[must_use]
    pub fn remove_for(&self, file: &Path) -> bool {
        let marker = Self::marker_path_for(file);
        if !marker.exists() {
            return true;
        }
        fs::remove_file(&marker).is_ok()
    }

    /// Process every marker inside a quarantine directory, ahead of the scan
    /// for new arrivals.
    ///
    /// Orphaned markers (no subject file) are deleted without acting.
    /// Expired markers have their action applied against the quarantined
    /// subject and are then deleted. Markers with an unrecognised action are
    /// logged and left in place.
    pub(crate) fn sweep(&self, quarantine: &Path) {
        let Ok(entries) = fs::read_dir(quarantine) else {
            return;
        };

        for entry in entries.filter_map(Result::ok) {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_marker_name(&name) {
                continue;
            }
            let marker = entry.path();
            let subject_name = &name[MARKER_PREFIX.len()..name.len() - MARKER_SUFFIX.len()];
            let subject = quarantine.join(subject_name);

            if !subject.exists() {
                debug!(marker = %marker.display(), "deleting orphaned marker");
                if let Err(err) = fs::remove_file(&marker) {
                    warn!(
                        error = %err,
                        marker = %marker.display(),
                        "failed to delete orphaned marker"
                    );
                }
                continue;
            }

            if !self.is_expired(&marker) {
                continue;
            }

            let parsed = match Self::read(&marker) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(
                        error = %err,
                        marker = %marker.display(),
                        "failed to read expired marker"
                    );
                    continue;
                }
            };

            match MarkerAction::from_entries(&parsed) {
                Some(MarkerAction::Delete) => {
                    debug!(subject = %subject.display(), marker = %marker.display(), "deleting file per marker");
                    if let Err(err) = fs::remove_file(&subject) {
                        warn!(
                            error = %err,
                            subject = %subject.display(),
                            "failed to delete file per marker"
                        );
                    }
                }
                Some(MarkerAction::Move(destination)) => {
                    debug!(
                        subject = %subject.display(),
                        destination = %destination.display(),
                        "moving file per marker"
                    );
                    if let Err(err) = fs::rename(&subject, &destination) {
                        warn!(
                            error = %err,
                            subject = %subject.display(),
                            destination = %destination.display(),
                            "failed to move file per marker"
                        );
                    }
                }
                None => {
                    warn!(marker = %marker.display(), "marker carries an unrecognised action; leaving it");
                    continue;
                }
            }

            if let Err(err) = fs::remove_file(&marker) {
                warn!(
                    error = %err,
                    marker = %marker.display(),
                    "failed to delete executed marker"
                );
            }
        }
    }

    /// Age of a qualifying marker file, or `None` when deferral is disabled
    /// or the marker is missing, not a regular file, empty, or unreadable.
    fn marker_age(&self, marker: &Path) -> Option<Duration> {
        if self.delay.is_zero() {
            return None;
        }
        let metadata = fs::metadata(marker).ok()?;
        if !metadata.is_file() || metadata.len() == 0 {
            return None;
        }
        let modified = metadata.modified().ok()?;
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use tempfile::TempDir;

    fn minute_protocol() -> MarkerProtocol {
        MarkerProtocol::new(Duration::from_secs(60))
    }

    #[test]
    fn marker_path_sits_beside_the_file() {
        let marker = MarkerProtocol::marker_path_for(Path::new("/watch/received/a.txt"));
        assert_eq!(marker, PathBuf::from("/watch/received/.~a.txt~"));
    }

    #[test]
    fn marker_names_are_recognised() {
        assert!(is_marker_name(".~a.txt~"));
        assert!(!is_marker_name(".~~"));
        assert!(!is_marker_name("a.txt"));
        assert!(!is_marker_name(".hidden"));
    }

    #[test]
    fn read_skips_malformed_lines() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        let marker = temp.path().join(".~a.txt~");
        fs::write(&marker, "action=move\nnonsense line\ndest=/tmp/out/a.txt\n")?;

        let entries = MarkerProtocol::read(&marker)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(
            MarkerAction::from_entries(&entries),
            Some(MarkerAction::Move(PathBuf::from("/tmp/out/a.txt")))
        );
        Ok(())
    }

    #[test]
    fn unknown_actions_parse_to_none() {
        let mut entries = BTreeMap::new();
        entries.insert("action".to_string(), "archive".to_string());
        assert_eq!(MarkerAction::from_entries(&entries), None);

        let mut move_without_dest = BTreeMap::new();
        move_without_dest.insert("action".to_string(), "move".to_string());
        assert_eq!(MarkerAction::from_entries(&move_without_dest), None);
    }

    #[test]
    fn remove_is_idempotent() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        let subject = temp.path().join("a.txt");
        fs::write(MarkerProtocol::marker_path_for(&subject), "action=delete\n")?;

        let protocol = minute_protocol();
        assert!(protocol.remove_for(&subject));
        assert!(protocol.remove_for(&subject));
        Ok(())
    }

    #[test]
    fn zero_delay_means_no_deferral() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        let subject = temp.path().join("a.txt");
        fs::write(&subject, b"payload")?;
        fs::write(MarkerProtocol::marker_path_for(&subject), "action=delete\n")?;

        let protocol = MarkerProtocol::new(Duration::ZERO);
        assert!(!protocol.delay_pending(&subject));
        assert!(!protocol.is_expired(&MarkerProtocol::marker_path_for(&subject)));
        Ok(())
    }

    #[test]
    fn fresh_marker_is_pending_not_expired() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        let subject = temp.path().join("a.txt");
        fs::write(&subject, b"payload")?;
        let marker = MarkerProtocol::marker_path_for(&subject);
        fs::write(&marker, "action=delete\n")?;

        let protocol = minute_protocol();
        assert!(protocol.delay_pending(&subject));
        assert!(!protocol.is_expired(&marker));
        Ok(())
    }

    #[test]
    fn absent_marker_is_neither_pending_nor_expired() {
        let protocol = minute_protocol();
        assert!(!protocol.delay_pending(Path::new("/nonexistent/a.txt")));
        assert!(!protocol.is_expired(Path::new("/nonexistent/.~a.txt~")));
    }

    #[test]
    fn sweep_deletes_orphaned_markers_without_acting() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        let marker = temp.path().join(".~gone.txt~");
        fs::write(&marker, "action=delete\n")?;

        minute_protocol().sweep(temp.path());
        assert!(!marker.exists());
        Ok(())
    }

    #[test]
    fn sweep_applies_expired_delete_action() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        let subject = temp.path().join("a.txt");
        fs::write(&subject, b"payload")?;
        let marker = temp.path().join(".~a.txt~");
        fs::write(&marker, "action=delete\n")?;

        // Tiny delay so the freshly written marker counts as expired.
        let protocol = MarkerProtocol::new(Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(20));
        protocol.sweep(temp.path());

        assert!(!subject.exists(), "subject should be deleted");
        assert!(!marker.exists(), "marker should be deleted after acting");
        Ok(())
    }

    #[test]
    fn sweep_applies_expired_move_action() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        let subject = temp.path().join("a.txt");
        fs::write(&subject, b"payload")?;
        let destination = temp.path().join("relocated.txt");
        let marker = temp.path().join(".~a.txt~");
        fs::write(
            &marker,
            format!("action=move\ndest={}\n", destination.display()),
        )?;

        let protocol = MarkerProtocol::new(Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(20));
        protocol.sweep(temp.path());

        assert!(!subject.exists());
        assert!(destination.exists());
        assert!(!marker.exists());
        Ok(())
    }

    #[test]
    fn sweep_leaves_unrecognised_actions_in_place() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        let subject = temp.path().join("a.txt");
        fs::write(&subject, b"payload")?;
        let marker = temp.path().join(".~a.txt~");
        fs::write(&marker, "action=archive\n")?;

        let protocol = MarkerProtocol::new(Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(20));
        protocol.sweep(temp.path());

        assert!(subject.exists(), "subject must not be touched");
        assert!(marker.exists(), "unrecognised marker must be left");
        Ok(())
    }

    #[test]
    fn sweep_ignores_pending_markers() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        let subject = temp.path().join("a.txt");
        fs::write(&subject, b"payload")?;
        let marker = temp.path().join(".~a.txt~");
        fs::write(&marker, "action=delete\n")?;

        minute_protocol().sweep(temp.path());
        assert!(subject.exists());
        assert!(marker.exists());
        Ok(())
    }
}
