//! The poll-cycle engine and its spawn handle.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sluice_config::{EffectiveWatchProfile, TimeFilterMode};
use sluice_events::{DirectoryWatermark, EventDispatcher, PollEvent, PollMonitor};
use sluice_telemetry::Metrics;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::automove::{AutoMover, AutomoveOutcome};
use crate::error::{PollerError, PollerResult};
use crate::filter::{AcceptAll, ExtensionFilter, ScanFilter, SystemFilter};
use crate::marker::MarkerProtocol;
use crate::scan;
use crate::sort;
use crate::stability::StabilityTracker;

/// One directory under watch, with its quarantine and watermark.
struct ControlledDirectory {
    root: PathBuf,
    resolved_root: PathBuf,
    quarantine: PathBuf,
    base_time_ms: i64,
}

enum PollerCommand {
    AddDirectory(PathBuf),
    RemoveDirectory(PathBuf),
}

/// The polling ingestion engine.
///
/// All mutable state (directory list, watermarks, stability memo) is owned by
/// the single task started by [`DirectoryPoller::spawn`]; nothing here is
/// shared, so no locks are involved. Monitors are registered before the
/// poller starts — consuming `self` on spawn is what enforces it — and
/// directory changes afterwards go through the [`PollerHandle`], which routes
/// them to the engine task to be applied between scans.
pub struct DirectoryPoller {
    profile: EffectiveWatchProfile,
    directories: Vec<ControlledDirectory>,
    dispatcher: EventDispatcher,
    metrics: Metrics,
    tracker: StabilityTracker,
    markers: MarkerProtocol,
    filter: SystemFilter,
}

impl std::fmt::Debug for DirectoryPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryPoller")
            .field("profile", &self.profile)
            .field("directories", &self.directories.len())
            .finish_non_exhaustive()
    }
}

impl DirectoryPoller {
    /// Build a poller from an effective profile.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::NotADirectory`] when a configured watch path
    /// does not exist or is not a directory.
    pub fn new(profile: EffectiveWatchProfile, metrics: Metrics) -> PollerResult<Self> {
        for warning in &profile.warnings {
            warn!(poller = %profile.name, %warning, "profile guard rail applied");
        }

        let mut directories = Vec::with_capacity(profile.directories.len());
        let mut quarantines = Vec::with_capacity(profile.directories.len());
        for root in &profile.directories {
            if !root.is_dir() {
                return Err(PollerError::NotADirectory { path: root.clone() });
            }
            let resolved_root = normalize(root);
            let quarantine = profile.quarantine_for(root);
            quarantines.push(quarantine.clone());
            directories.push(ControlledDirectory {
                root: root.clone(),
                resolved_root,
                quarantine,
                base_time_ms: 0,
            });
        }

        let user_filter: Arc<dyn ScanFilter> = if profile.extensions.is_empty() {
            Arc::new(AcceptAll)
        } else {
            Arc::new(ExtensionFilter::new(profile.extensions.clone()))
        };
        let filter = SystemFilter::new(
            profile.system_subdirectories.clone(),
            quarantines,
            user_filter,
        );
        let dispatcher = EventDispatcher::new(profile.name.clone());
        let markers = MarkerProtocol::new(profile.post_process_delay);

        Ok(Self {
            profile,
            directories,
            dispatcher,
            metrics,
            tracker: StabilityTracker::new(),
            markers,
            filter,
        })
    }

    /// Replace the user filter composed beneath the system scan rules. The
    /// default user filter is the profile's extension allowlist.
    #[must_use]
    pub fn with_filter(mut self, user_filter: Arc<dyn ScanFilter>) -> Self {
        let quarantines = self
            .directories
            .iter()
            .map(|directory| directory.quarantine.clone())
            .collect();
        self.filter = SystemFilter::new(
            self.profile.system_subdirectories.clone(),
            quarantines,
            user_filter,
        );
        self
    }

    /// Register a monitor; monitors receive events in registration order.
    pub fn register_monitor(&mut self, monitor: Arc<dyn PollMonitor>) {
        self.dispatcher.register(monitor);
    }

    /// Name of this poller instance.
    #[must_use]
    pub fn name(&self) -> &str {
        self.profile.name.as_str()
    }

    /// Create quarantine directories up front. Failing to create one is a
    /// configuration error that aborts startup.
    pub(crate) fn ensure_quarantines(&self) -> PollerResult<()> {
        if !self.profile.auto_move {
            return Ok(());
        }
        for directory in &self.directories {
            if directory.quarantine.exists() {
                continue;
            }
            debug!(
                quarantine = %directory.quarantine.display(),
                "quarantine directory missing, creating"
            );
            fs::create_dir_all(&directory.quarantine).map_err(|source| {
                PollerError::QuarantineCreate {
                    path: directory.quarantine.clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }

    /// Start the engine task and hand back its control handle.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::QuarantineCreate`] when a quarantine directory
    /// cannot be created.
    pub fn spawn(self) -> PollerResult<PollerHandle> {
        self.ensure_quarantines()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let name = self.profile.name.clone();
        let task = tokio::spawn(self.run(shutdown_rx, commands_rx));

        Ok(PollerHandle {
            name,
            shutdown_tx,
            commands_tx,
            task,
        })
    }

    async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut commands_rx: mpsc::UnboundedReceiver<PollerCommand>,
    ) {
        debug!(
            poller = %self.profile.name,
            interval = ?self.profile.poll_interval,
            "polling started"
        );
        let mut skip_first_cycle = self.profile.start_by_sleeping;
        loop {
            self.apply_commands(&mut commands_rx);
            if skip_first_cycle {
                skip_first_cycle = false;
            } else {
                self.run_cycle(&shutdown_rx);
            }
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                () = tokio::time::sleep(self.profile.poll_interval) => {
                    debug!(poller = %self.profile.name, "poller waking up");
                }
                _ = shutdown_rx.changed() => {}
            }
            if *shutdown_rx.borrow() {
                break;
            }
        }
        debug!(poller = %self.profile.name, "poller terminated");
    }

    /// One full cycle over every controlled directory. The shutdown flag is
    /// consulted between directories and between per-file emissions; the
    /// in-progress atomic step always completes.
    pub(crate) fn run_cycle(&mut self, shutdown: &watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        self.emit(PollEvent::CycleStarted);

        for index in 0..self.directories.len() {
            if *shutdown.borrow() {
                return;
            }
            if !self.scan_directory(index, shutdown) {
                return;
            }
        }

        if *shutdown.borrow() {
            return;
        }
        let watermarks = self
            .directories
            .iter()
            .map(|directory| DirectoryWatermark {
                directory: directory.root.clone(),
                base_time_ms: directory.base_time_ms,
            })
            .collect();
        self.emit(PollEvent::CycleEnded { watermarks });
        self.metrics.inc_cycle();
    }

    #[allow(clippy::too_many_lines)]
    fn scan_directory(&mut self, index: usize, shutdown: &watch::Receiver<bool>) -> bool {
        let root = self.directories[index].root.clone();
        let quarantine = self.directories[index].quarantine.clone();
        let base_time = self.directories[index].base_time_ms;

        self.emit(PollEvent::DirectoryLookupStarted {
            directory: root.clone(),
        });
        if *shutdown.borrow() {
            return false;
        }

        let lookup_time_ms = Utc::now().timestamp_millis();
        let mut entries = scan::list_entries(&root, &self.filter);
        if self.profile.time_filter != TimeFilterMode::Off {
            entries.retain(|entry| !entry.is_dir && entry.modified_ms > base_time);
        }
        sort::sort_entries(&mut entries, &self.profile.sort);

        let mut max_found_mtime = base_time;
        let (set_directory, found) = if self.profile.auto_move {
            self.markers.sweep(&quarantine);

            let roots: Vec<PathBuf> = self
                .directories
                .iter()
                .map(|directory| directory.resolved_root.clone())
                .collect();
            let dispatcher = &self.dispatcher;
            let metrics = &self.metrics;
            let mut mover = AutoMover {
                tracker: &mut self.tracker,
                markers: &self.markers,
                controlled_roots: &roots,
                bypass_locked_files: self.profile.bypass_locked_files,
            };

            let mut moved = Vec::new();
            for entry in &entries {
                match mover.try_move(entry, &quarantine) {
                    AutomoveOutcome::Deferred => {}
                    AutomoveOutcome::DeleteFailed { destination } => {
                        metrics.inc_automove_failure("delete");
                        dispatcher.report_delete_failure(&destination);
                    }
                    AutomoveOutcome::MoveFailed { destination } => {
                        metrics.inc_automove_failure("move");
                        dispatcher.report_move_failure(&entry.path, &destination);
                    }
                    AutomoveOutcome::Moved {
                        destination,
                        marker_removed,
                    } => {
                        if !marker_removed {
                            metrics.inc_automove_failure("move");
                            dispatcher.report_move_failure(&entry.path, &destination);
                        }
                        metrics.inc_file_moved();
                        metrics.inc_event("file_moved");
                        dispatcher.broadcast(PollEvent::FileMoved {
                            origin: entry.path.clone(),
                            destination: destination.clone(),
                        });
                        max_found_mtime = max_found_mtime.max(entry.modified_ms);
                        moved.push(destination);
                    }
                }
            }
            (quarantine, moved)
        } else {
            for entry in &entries {
                max_found_mtime = max_found_mtime.max(entry.modified_ms);
            }
            (
                root.clone(),
                entries.iter().map(|entry| entry.path.clone()).collect(),
            )
        };

        if !found.is_empty() {
            self.emit(PollEvent::FileSetFound {
                directory: set_directory,
                files: found.clone(),
            });
        }
        if *shutdown.borrow() {
            return false;
        }
        if self.profile.emit_file_found {
            for file in &found {
                self.emit(PollEvent::FileFound { file: file.clone() });
                if *shutdown.borrow() {
                    return false;
                }
            }
        }

        match self.profile.time_filter {
            TimeFilterMode::Off => {}
            TimeFilterMode::PollingTime => {
                self.directories[index].base_time_ms = lookup_time_ms;
            }
            TimeFilterMode::ModificationTime => {
                self.directories[index].base_time_ms = max_found_mtime;
            }
        }

        self.emit(PollEvent::DirectoryLookupEnded { directory: root });
        true
    }

    fn emit(&self, event: PollEvent) {
        self.metrics.inc_event(event.kind());
        self.dispatcher.broadcast(event);
    }

    fn apply_commands(&mut self, commands: &mut mpsc::UnboundedReceiver<PollerCommand>) {
        while let Ok(command) = commands.try_recv() {
            match command {
                PollerCommand::AddDirectory(path) => self.add_directory(path),
                PollerCommand::RemoveDirectory(path) => self.remove_directory(&path),
            }
        }
    }

    fn add_directory(&mut self, path: PathBuf) {
        if self
            .directories
            .iter()
            .any(|directory| directory.root == path)
        {
            debug!(directory = %path.display(), "directory is already controlled");
            return;
        }
        if !path.is_dir() {
            warn!(directory = %path.display(), "cannot watch: not a directory");
            return;
        }
        let resolved_root = normalize(&path);
        let quarantine = self.profile.quarantine_for(&path);
        if self.profile.auto_move
            && let Err(err) = fs::create_dir_all(&quarantine)
        {
            warn!(
                error = %err,
                quarantine = %quarantine.display(),
                "cannot watch: quarantine directory could not be created"
            );
            return;
        }
        self.filter.track_quarantine(quarantine.clone());
        info!(directory = %path.display(), "watch directory added");
        self.directories.push(ControlledDirectory {
            root: path,
            resolved_root,
            quarantine,
            base_time_ms: 0,
        });
    }

    fn remove_directory(&mut self, path: &Path) {
        if let Some(position) = self
            .directories
            .iter()
            .position(|directory| directory.root == *path)
        {
            let removed = self.directories.remove(position);
            self.filter.untrack_quarantine(&removed.quarantine);
            info!(directory = %removed.root.display(), "watch directory removed");
        } else {
            warn!(
                directory = %path.display(),
                "remove requested for a directory that is not controlled"
            );
        }
    }
}

/// Control handle for a spawned poller.
///
/// `shutdown` is asynchronous and cooperative: it interrupts the engine's
/// sleep but never an in-progress atomic step. Callers poll [`is_running`]
/// (or await [`join`]) to detect full termination.
///
/// [`is_running`]: PollerHandle::is_running
/// [`join`]: PollerHandle::join
pub struct PollerHandle {
    name: String,
    shutdown_tx: watch::Sender<bool>,
    commands_tx: mpsc::UnboundedSender<PollerCommand>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Name of the underlying poller instance.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request shutdown. Idempotent; returns immediately.
    pub fn shutdown(&self) {
        debug!(poller = %self.name, "polling shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether the engine task is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the engine to start watching `path`. Applied between scans; a
    /// path that is not a directory is logged and ignored.
    pub fn add_directory(&self, path: PathBuf) {
        let _ = self.commands_tx.send(PollerCommand::AddDirectory(path));
    }

    /// Ask the engine to stop watching `path`. Applied between scans; an
    /// uncontrolled path is logged and ignored.
    pub fn remove_directory(&self, path: PathBuf) {
        let _ = self.commands_tx.send(PollerCommand::RemoveDirectory(path));
    }

    /// Wait for the engine task to finish. Call [`shutdown`] first.
    ///
    /// [`shutdown`]: PollerHandle::shutdown
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            warn!(poller = %self.name, error = %err, "poller task ended abnormally");
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
