//! Worker pool, completion drainer, and terminal-folder bookkeeping.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use sluice_config::EffectivePipelineProfile;
use sluice_events::PollMonitor;
use sluice_telemetry::Metrics;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::processor::FileProcessor;

const WORKING_DIR: &str = "working";
const COMPLETED_DIR: &str = "completed";
const FAILED_DIR: &str = "failed";
const FAILURE_LOG_SUFFIX: &str = ".log";

/// Result of one processing task, produced exactly once per submitted file
/// and consumed exactly once by the drainer.
struct TaskResult {
    source: PathBuf,
    error: Option<anyhow::Error>,
}

impl TaskResult {
    fn completed(source: PathBuf) -> Self {
        Self {
            source,
            error: None,
        }
    }

    fn failed(source: PathBuf, error: anyhow::Error) -> Self {
        Self {
            source,
            error: Some(error),
        }
    }
}

/// Bounded concurrent processing pipeline.
///
/// Submission is fire-and-forget: the dispatching thread spawns a task and
/// returns immediately, the semaphore bounds how many tasks actually run,
/// and everything admitted eventually produces exactly one [`TaskResult`].
/// Backpressure is implicit — queued tasks simply wait for a permit — which
/// is a known limitation inherited from the design, not an oversight.
#[derive(Clone)]
pub struct ProcessingPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    base_dir: PathBuf,
    delete_on_success: bool,
    processor: Arc<dyn FileProcessor>,
    semaphore: Arc<Semaphore>,
    results_tx: Mutex<Option<mpsc::UnboundedSender<TaskResult>>>,
    drainer: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessingPipeline {
    /// Create a pipeline and start its completion drainer.
    ///
    /// Must be called within a tokio runtime. The `working/`, `completed/`,
    /// and `failed/` folders are created lazily on first use.
    #[must_use]
    pub fn new(
        profile: &EffectivePipelineProfile,
        processor: Arc<dyn FileProcessor>,
        metrics: Metrics,
    ) -> Self {
        for warning in &profile.warnings {
            warn!(base_dir = %profile.base_dir.display(), %warning, "pipeline guard rail applied");
        }

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let drainer = tokio::spawn(drain(
            results_rx,
            DrainContext {
                base_dir: profile.base_dir.clone(),
                delete_on_success: profile.delete_on_success,
                metrics,
            },
        ));

        Self {
            inner: Arc::new(PipelineInner {
                base_dir: profile.base_dir.clone(),
                delete_on_success: profile.delete_on_success,
                processor,
                semaphore: Arc::new(Semaphore::new(profile.max_concurrent)),
                results_tx: Mutex::new(Some(results_tx)),
                drainer: Mutex::new(Some(drainer)),
            }),
        }
    }

    /// Submit one file for processing. Never blocks the caller; a pipeline
    /// that has been closed logs and drops the submission.
    ///
    /// # Panics
    ///
    /// Panics if the internal admission mutex is poisoned.
    pub fn submit(&self, file: PathBuf) {
        let results_tx = {
            let guard = self
                .inner
                .results_tx
                .lock()
                .expect("pipeline sender mutex poisoned");
            guard.clone()
        };
        let Some(results_tx) = results_tx else {
            warn!(file = %file.display(), "pipeline is closed; dropping submission");
            return;
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let Ok(_permit) = Arc::clone(&inner.semaphore).acquire_owned().await else {
                return;
            };
            let processor = Arc::clone(&inner.processor);
            let working = inner.base_dir.join(WORKING_DIR);
            let source_for_panic = file.clone();
            let result =
                match tokio::task::spawn_blocking(move || run_task(&working, &*processor, file))
                    .await
                {
                    Ok(result) => result,
                    Err(err) => TaskResult::failed(
                        source_for_panic,
                        anyhow!("processing task did not complete: {err}"),
                    ),
                };
            let _ = results_tx.send(result);
        });
    }

    /// Stop admitting work and wait for in-flight tasks and the drainer to
    /// finish. In-flight tasks are never cancelled.
    ///
    /// # Panics
    ///
    /// Panics if the internal admission mutex is poisoned.
    pub async fn close(&self) {
        self.inner
            .results_tx
            .lock()
            .expect("pipeline sender mutex poisoned")
            .take();
        let drainer = self
            .inner
            .drainer
            .lock()
            .expect("pipeline drainer mutex poisoned")
            .take();
        if let Some(drainer) = drainer {
            if let Err(err) = drainer.await {
                warn!(error = %err, "pipeline drainer ended abnormally");
            }
        }
    }

    /// Whether successes are deleted rather than kept in `completed/`.
    #[must_use]
    pub fn delete_on_success(&self) -> bool {
        self.inner.delete_on_success
    }

    /// The directory the terminal folders live under.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.inner.base_dir
    }
}

impl PollMonitor for ProcessingPipeline {
    fn file_set_found(&self, _directory: &Path, files: &[PathBuf]) {
        for file in files {
            debug!(file = %file.display(), "pipeline accepted file");
            self.submit(file.clone());
        }
    }

    fn move_file_failed(&self, origin: &Path, destination: &Path) {
        warn!(
            origin = %origin.display(),
            destination = %destination.display(),
            "poller could not quarantine a file destined for processing"
        );
    }
}

/// Move the file into `working/` and run the processor on it. Always returns
/// exactly one result.
fn run_task(working: &Path, processor: &dyn FileProcessor, source: PathBuf) -> TaskResult {
    if let Err(err) = fs::create_dir_all(working) {
        return TaskResult::failed(
            source,
            anyhow!("could not create working directory {}: {err}", working.display()),
        );
    }

    let Some(name) = source.file_name().map(ToOwned::to_owned) else {
        return TaskResult::failed(source, anyhow!("submitted path has no file name"));
    };
    let staged = working.join(name);
    if staged.exists()
        && let Err(err) = fs::remove_file(&staged)
    {
        return TaskResult::failed(
            source,
            anyhow!("could not clear stale working copy {}: {err}", staged.display()),
        );
    }
    if let Err(err) = fs::rename(&source, &staged) {
        return TaskResult::failed(
            source,
            anyhow!("could not move file into {}: {err}", working.display()),
        );
    }

    match processor.process(&staged) {
        Ok(()) => TaskResult::completed(staged),
        Err(err) => TaskResult::failed(staged, err),
    }
}

struct DrainContext {
    base_dir: PathBuf,
    delete_on_success: bool,
    metrics: Metrics,
}

/// Consume task results in ready order and perform the terminal-folder
/// moves. This task is the sole owner of `completed/` and `failed/`.
async fn drain(mut results_rx: mpsc::UnboundedReceiver<TaskResult>, ctx: DrainContext) {
    while let Some(result) = results_rx.recv().await {
        match result.error {
            None => {
                ctx.metrics.inc_pipeline_task("completed");
                complete(&ctx, &result.source);
            }
            Some(error) => {
                ctx.metrics.inc_pipeline_task("failed");
                warn!(
                    file = %result.source.display(),
                    error = %error,
                    "processing failed"
                );
                fail(&ctx, &result.source, &error);
            }
        }
    }
    debug!(base_dir = %ctx.base_dir.display(), "pipeline drainer stopped");
}

fn complete(ctx: &DrainContext, file: &Path) {
    if !file.exists() {
        warn!(file = %file.display(), "completed file has vanished; nothing to finalise");
        return;
    }
    if ctx.delete_on_success {
        debug!(file = %file.display(), "processing completed, deleting");
        if let Err(err) = fs::remove_file(file) {
            warn!(error = %err, file = %file.display(), "could not delete completed file");
        }
        return;
    }

    let completed_dir = ctx.base_dir.join(COMPLETED_DIR);
    if let Err(err) = fs::create_dir_all(&completed_dir) {
        warn!(error = %err, directory = %completed_dir.display(), "could not create completed folder");
        return;
    }
    let Some(name) = file.file_name() else {
        return;
    };
    let destination = completed_dir.join(name);
    if destination.exists()
        && let Err(err) = fs::remove_file(&destination)
    {
        warn!(
            error = %err,
            destination = %destination.display(),
            "could not clear stale completed artifact"
        );
    }
    debug!(file = %file.display(), destination = %destination.display(), "processing completed, archiving");
    if let Err(err) = fs::rename(file, &destination) {
        warn!(
            error = %err,
            file = %file.display(),
            destination = %destination.display(),
            "could not move completed file"
        );
    }
}

fn fail(ctx: &DrainContext, file: &Path, error: &anyhow::Error) {
    let failed_dir = ctx.base_dir.join(FAILED_DIR);
    if let Err(err) = fs::create_dir_all(&failed_dir) {
        warn!(error = %err, directory = %failed_dir.display(), "could not create failed folder");
        return;
    }
    let Some(name) = file.file_name().and_then(|name| name.to_str()) else {
        return;
    };
    let destination = failed_dir.join(name);
    let report = failed_dir.join(format!("{name}{FAILURE_LOG_SUFFIX}"));
    for stale in [&destination, &report] {
        if stale.exists()
            && let Err(err) = fs::remove_file(stale)
        {
            warn!(error = %err, path = %stale.display(), "could not clear stale failure artifact");
        }
    }

    if file.exists()
        && let Err(err) = fs::rename(file, &destination)
    {
        warn!(
            error = %err,
            file = %file.display(),
            destination = %destination.display(),
            "could not move failed file"
        );
    }
    if let Err(err) = fs::write(&report, format!("{error:#}\n\n{error:?}\n")) {
        warn!(error = %err, report = %report.display(), "could not write failure report");
    }
}
