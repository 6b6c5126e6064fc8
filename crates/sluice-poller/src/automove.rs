//! The auto-move pass: quarantine handoff for stable candidates.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::marker::MarkerProtocol;
use crate::scan::ScanEntry;
use crate::stability::{Stability, StabilityTracker};

/// Result of one auto-move attempt. Failures here are signals for the
/// dispatcher's dedicated callbacks, never errors: the candidate stays in
/// place and is retried on the next cycle.
pub(crate) enum AutomoveOutcome {
    /// Transient condition (unstable, locked, pending delay, skip rule);
    /// silently retried next cycle.
    Deferred,
    /// A stale file at the destination could not be deleted.
    DeleteFailed {
        /// The destination that could not be cleared.
        destination: PathBuf,
    },
    /// The rename itself (or the lock probe) failed.
    MoveFailed {
        /// The intended destination.
        destination: PathBuf,
    },
    /// The candidate was renamed into quarantine.
    Moved {
        /// The post-move location.
        destination: PathBuf,
        /// False when the candidate's marker could not be removed after the
        /// move; the engine signals this as a non-fatal move failure.
        marker_removed: bool,
    },
}

/// Per-cycle auto-move executor borrowing the engine's mutable state.
pub(crate) struct AutoMover<'a> {
    pub(crate) tracker: &'a mut StabilityTracker,
    pub(crate) markers: &'a MarkerProtocol,
    pub(crate) controlled_roots: &'a [PathBuf],
    pub(crate) bypass_locked_files: bool,
}

impl AutoMover<'_> {
    /// Attempt to move one filtered candidate into `quarantine`.
    pub(crate) fn try_move(&mut self, entry: &ScanEntry, quarantine: &Path) -> AutomoveOutcome {
        let origin = &entry.path;

        if self.should_skip(origin)
            || self.is_controlled_root(origin)
            || self.markers.delay_pending(origin)
        {
            return AutomoveOutcome::Deferred;
        }

        let destination = quarantine.join(&entry.name);
        if destination.exists() {
            debug!(destination = %destination.display(), "clearing stale quarantine target");
            if let Err(err) = remove_existing(&destination) {
                warn!(
                    error = %err,
                    destination = %destination.display(),
                    "could not delete stale quarantine target"
                );
                return AutomoveOutcome::DeleteFailed { destination };
            }
        }

        // Heal a quarantine directory deleted mid-run; a real failure will
        // surface through the rename below.
        let _ = fs::create_dir_all(quarantine);

        if self.bypass_locked_files && origin.is_file() {
            match probe_exclusive_lock(origin) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(file = %origin.display(), "file is locked, ignoring");
                    return AutomoveOutcome::Deferred;
                }
                Err(err) => {
                    warn!(error = %err, file = %origin.display(), "lock probe failed");
                    return AutomoveOutcome::MoveFailed { destination };
                }
            }
        }

        if !self.subtree_stable(origin) {
            return AutomoveOutcome::Deferred;
        }

        if let Err(err) = fs::rename(origin, &destination) {
            warn!(
                error = %err,
                origin = %origin.display(),
                destination = %destination.display(),
                "could not move file into quarantine"
            );
            return AutomoveOutcome::MoveFailed { destination };
        }
        self.tracker.forget(origin);

        remove_shadow(origin);
        let marker_removed = self.markers.remove_for(origin);

        AutomoveOutcome::Moved {
            destination,
            marker_removed,
        }
    }

    /// Candidates that are never touched: vanished or special files, hidden
    /// or dot-named entries, and zero-length regular files.
    fn should_skip(&self, path: &Path) -> bool {
        let Ok(metadata) = fs::metadata(path) else {
            return true;
        };
        let dot_named = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        (!metadata.is_file() && !metadata.is_dir())
            || dot_named
            || (metadata.is_file() && metadata.len() == 0)
    }

    fn is_controlled_root(&self, path: &Path) -> bool {
        let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.controlled_roots.iter().any(|root| *root == resolved)
    }

    /// Whether every regular file under `origin` (or `origin` itself) is
    /// stable and free of pending marker delays. All members are observed
    /// even once instability is detected so the whole subtree converges
    /// together.
    fn subtree_stable(&mut self, origin: &Path) -> bool {
        let (members, pending) = self.collect_members(origin);
        let mut stable = true;
        for (path, len) in &members {
            if self.tracker.observe(path, *len) == Stability::Unstable {
                trace!(file = %path.display(), "file is not stable yet");
                stable = false;
            }
        }
        stable && !pending
    }

    fn collect_members(&self, origin: &Path) -> (Vec<(PathBuf, u64)>, bool) {
        let mut members = Vec::new();
        let mut pending = false;

        if origin.is_dir() {
            let mut walker = WalkDir::new(origin).min_depth(1).into_iter();
            loop {
                let entry = match walker.next() {
                    None => break,
                    Some(Err(_)) => continue,
                    Some(Ok(entry)) => entry,
                };
                let dot_named = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.'));
                if entry.file_type().is_dir() {
                    if dot_named || self.is_controlled_root(entry.path()) {
                        walker.skip_current_dir();
                    }
                    continue;
                }
                if dot_named || !entry.file_type().is_file() {
                    continue;
                }
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                if metadata.len() == 0 {
                    continue;
                }
                if self.markers.delay_pending(entry.path()) {
                    pending = true;
                    continue;
                }
                members.push((entry.path().to_path_buf(), metadata.len()));
            }
        } else if let Ok(metadata) = fs::metadata(origin) {
            members.push((origin.to_path_buf(), metadata.len()));
        }

        (members, pending)
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Best-effort removal of the resource-fork shadow (`._<name>`) some network
/// filesystems create beside transferred files. The shadow is tied to the
/// original and breaks later moves if it lingers.
fn remove_shadow(origin: &Path) {
    let name = origin
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let shadow = origin.with_file_name(format!("._{name}"));
    if shadow.exists() {
        match fs::remove_file(&shadow) {
            Ok(()) => trace!(shadow = %shadow.display(), "deleted resource-fork shadow"),
            Err(err) => warn!(
                error = %err,
                shadow = %shadow.display(),
                "unable to delete resource-fork shadow"
            ),
        }
    }
}

#[cfg(unix)]
fn probe_exclusive_lock(path: &Path) -> io::Result<bool> {
    use nix::fcntl::{Flock, FlockArg};

    let file = fs::OpenOptions::new().read(true).write(true).open(path)?;
    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => {
            drop(lock);
            Ok(true)
        }
        Err((_file, nix::errno::Errno::EWOULDBLOCK)) => Ok(false),
        Err((_file, errno)) => Err(io::Error::from(errno)),
    }
}

#[cfg(not(unix))]
fn probe_exclusive_lock(_path: &Path) -> io::Result<bool> {
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{ScanEntry, system_time_ms};
    use std::error::Error;
    use std::time::Duration;
    use tempfile::TempDir;

    fn entry_for(path: &Path) -> ScanEntry {
        let metadata = fs::metadata(path).expect("candidate metadata");
        ScanEntry {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .and_then(|name| name.to_str())
                .expect("utf-8 name")
                .to_string(),
            len: metadata.len(),
            modified_ms: metadata.modified().map(system_time_ms).unwrap_or_default(),
            is_dir: metadata.is_dir(),
        }
    }

    struct Fixture {
        _temp: TempDir,
        watch: PathBuf,
        quarantine: PathBuf,
        tracker: StabilityTracker,
        markers: MarkerProtocol,
        roots: Vec<PathBuf>,
    }

    impl Fixture {
        fn new() -> Result<Self, Box<dyn Error>> {
            let temp = TempDir::new()?;
            let watch = temp.path().join("watch");
            let quarantine = watch.join("received");
            fs::create_dir_all(&quarantine)?;
            let roots = vec![fs::canonicalize(&watch)?];
            Ok(Self {
                _temp: temp,
                watch,
                quarantine,
                tracker: StabilityTracker::new(),
                markers: MarkerProtocol::new(Duration::ZERO),
                roots,
            })
        }

        fn mover(&mut self) -> AutoMover<'_> {
            AutoMover {
                tracker: &mut self.tracker,
                markers: &self.markers,
                controlled_roots: &self.roots,
                bypass_locked_files: false,
            }
        }
    }

    #[test]
    fn file_moves_only_after_two_stable_observations() -> Result<(), Box<dyn Error>> {
        let mut fx = Fixture::new()?;
        let file = fx.watch.join("a.txt");
        fs::write(&file, b"0123456789")?;
        let entry = entry_for(&file);
        let quarantine = fx.quarantine.clone();

        let first = fx.mover().try_move(&entry, &quarantine);
        assert!(matches!(first, AutomoveOutcome::Deferred));
        assert!(file.exists());

        let second = fx.mover().try_move(&entry, &quarantine);
        let AutomoveOutcome::Moved {
            destination,
            marker_removed,
        } = second
        else {
            panic!("expected the second attempt to move the file");
        };
        assert!(marker_removed);
        assert!(!file.exists(), "origin must be gone after the move");
        assert_eq!(destination, quarantine.join("a.txt"));
        assert!(destination.exists());
        Ok(())
    }

    #[test]
    fn growing_file_is_deferred_again() -> Result<(), Box<dyn Error>> {
        let mut fx = Fixture::new()?;
        let file = fx.watch.join("a.txt");
        fs::write(&file, b"01234")?;
        let quarantine = fx.quarantine.clone();

        assert!(matches!(
            fx.mover().try_move(&entry_for(&file), &quarantine),
            AutomoveOutcome::Deferred
        ));
        fs::write(&file, b"0123456789")?;
        assert!(matches!(
            fx.mover().try_move(&entry_for(&file), &quarantine),
            AutomoveOutcome::Deferred
        ));
        assert!(matches!(
            fx.mover().try_move(&entry_for(&file), &quarantine),
            AutomoveOutcome::Moved { .. }
        ));
        Ok(())
    }

    #[test]
    fn zero_length_and_dot_files_are_skipped() -> Result<(), Box<dyn Error>> {
        let mut fx = Fixture::new()?;
        let empty = fx.watch.join("empty.txt");
        fs::write(&empty, b"")?;
        let hidden = fx.watch.join(".partial");
        fs::write(&hidden, b"data")?;
        let quarantine = fx.quarantine.clone();

        for file in [&empty, &hidden] {
            let entry = entry_for(file);
            assert!(matches!(
                fx.mover().try_move(&entry, &quarantine),
                AutomoveOutcome::Deferred
            ));
            assert!(matches!(
                fx.mover().try_move(&entry, &quarantine),
                AutomoveOutcome::Deferred
            ));
            assert!(file.exists());
        }
        Ok(())
    }

    #[test]
    fn directory_moves_only_when_whole_subtree_is_stable() -> Result<(), Box<dyn Error>> {
        let mut fx = Fixture::new()?;
        let tree = fx.watch.join("batch");
        fs::create_dir_all(tree.join("nested"))?;
        fs::write(tree.join("one.txt"), b"one")?;
        fs::write(tree.join("nested/two.txt"), b"two")?;
        let quarantine = fx.quarantine.clone();

        let entry = entry_for(&tree);
        assert!(matches!(
            fx.mover().try_move(&entry, &quarantine),
            AutomoveOutcome::Deferred
        ));

        // One member changed between cycles: the whole candidate waits.
        fs::write(tree.join("nested/two.txt"), b"two grew")?;
        assert!(matches!(
            fx.mover().try_move(&entry, &quarantine),
            AutomoveOutcome::Deferred
        ));

        assert!(matches!(
            fx.mover().try_move(&entry, &quarantine),
            AutomoveOutcome::Moved { .. }
        ));
        assert!(quarantine.join("batch/nested/two.txt").exists());
        Ok(())
    }

    #[test]
    fn stale_quarantine_target_is_replaced() -> Result<(), Box<dyn Error>> {
        let mut fx = Fixture::new()?;
        let file = fx.watch.join("a.txt");
        fs::write(&file, b"fresh-payload")?;
        fs::write(fx.quarantine.join("a.txt"), b"stale")?;
        let quarantine = fx.quarantine.clone();

        let entry = entry_for(&file);
        fx.mover().try_move(&entry, &quarantine);
        let outcome = fx.mover().try_move(&entry, &quarantine);
        assert!(matches!(outcome, AutomoveOutcome::Moved { .. }));
        assert_eq!(fs::read(quarantine.join("a.txt"))?, b"fresh-payload");
        Ok(())
    }

    #[test]
    fn pending_marker_defers_the_candidate() -> Result<(), Box<dyn Error>> {
        let mut fx = Fixture::new()?;
        fx.markers = MarkerProtocol::new(Duration::from_secs(600));
        let file = fx.watch.join("a.txt");
        fs::write(&file, b"payload")?;
        fs::write(fx.watch.join(".~a.txt~"), "action=delete\n")?;
        let quarantine = fx.quarantine.clone();

        let entry = entry_for(&file);
        for _ in 0..3 {
            assert!(matches!(
                fx.mover().try_move(&entry, &quarantine),
                AutomoveOutcome::Deferred
            ));
        }
        assert!(file.exists());
        Ok(())
    }

    #[test]
    fn marker_is_removed_alongside_a_successful_move() -> Result<(), Box<dyn Error>> {
        // Zero delay: the marker never gates the move, but removal after a
        // successful move still applies.
        let mut fx = Fixture::new()?;
        let file = fx.watch.join("a.txt");
        fs::write(&file, b"payload")?;
        let marker = fx.watch.join(".~a.txt~");
        fs::write(&marker, "action=delete\n")?;
        let quarantine = fx.quarantine.clone();

        let entry = entry_for(&file);
        fx.mover().try_move(&entry, &quarantine);
        let outcome = fx.mover().try_move(&entry, &quarantine);
        assert!(matches!(
            outcome,
            AutomoveOutcome::Moved {
                marker_removed: true,
                ..
            }
        ));
        assert!(!marker.exists(), "marker must be removed after the move");
        Ok(())
    }

    #[test]
    fn resource_fork_shadow_is_deleted_after_the_move() -> Result<(), Box<dyn Error>> {
        let mut fx = Fixture::new()?;
        let file = fx.watch.join("clip.mov");
        fs::write(&file, b"media")?;
        let shadow = fx.watch.join("._clip.mov");
        fs::write(&shadow, b"fork")?;
        let quarantine = fx.quarantine.clone();

        let entry = entry_for(&file);
        fx.mover().try_move(&entry, &quarantine);
        assert!(matches!(
            fx.mover().try_move(&entry, &quarantine),
            AutomoveOutcome::Moved { .. }
        ));
        assert!(!shadow.exists());
        Ok(())
    }

    #[test]
    fn mtime_is_not_part_of_the_stability_signal() -> Result<(), Box<dyn Error>> {
        // Same-size rewrites are indistinguishable from completion; the
        // second observation reports stable even though content changed.
        let mut fx = Fixture::new()?;
        let file = fx.watch.join("a.txt");
        fs::write(&file, b"aaaa")?;
        let quarantine = fx.quarantine.clone();

        let entry = entry_for(&file);
        fx.mover().try_move(&entry, &quarantine);
        fs::write(&file, b"bbbb")?;
        assert!(matches!(
            fx.mover().try_move(&entry, &quarantine),
            AutomoveOutcome::Moved { .. }
        ));
        Ok(())
    }
}
