//! Full ingest flow: the poller's quarantine handoff feeding the pipeline.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sluice_config::{
    PipelineProfile, TimeFilterMode, WatchProfile, normalize_pipeline_profile,
    normalize_watch_profile,
};
use sluice_pipeline::{FileProcessor, ProcessingPipeline};
use sluice_poller::DirectoryPoller;
use sluice_telemetry::Metrics;
use sluice_test_support::ScratchDir;
use tokio::time::{Instant, sleep};

struct CountingProcessor;

impl FileProcessor for CountingProcessor {
    fn process(&self, file: &Path) -> anyhow::Result<()> {
        anyhow::ensure!(file.exists(), "file must be staged before processing");
        Ok(())
    }
}

async fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(25)).await;
    }
    condition()
}

#[tokio::test]
async fn quarantined_files_flow_into_completed() -> Result<()> {
    let scratch = ScratchDir::new()?;
    let inbox = scratch.create_dir("inbox")?;

    let watch_profile = WatchProfile {
        name: Some("ingest-flow".to_string()),
        directories: vec![inbox.clone()],
        quarantine_overrides: BTreeMap::new(),
        poll_interval_ms: 100,
        time_filter: TimeFilterMode::Off,
        emit_file_found: false,
        bypass_locked_files: false,
        post_process_delay_minutes: 0,
        auto_move: true,
        start_by_sleeping: false,
        sort: vec![],
        extensions: vec![],
        system_subdirectories: vec![],
    };
    let pipeline_profile = PipelineProfile {
        base_dir: inbox.clone(),
        max_concurrent: 2,
        delete_on_success: false,
    };

    let metrics = Metrics::new()?;
    let pipeline = ProcessingPipeline::new(
        &normalize_pipeline_profile(&pipeline_profile)?,
        Arc::new(CountingProcessor),
        metrics.clone(),
    );
    let mut poller = DirectoryPoller::new(normalize_watch_profile(&watch_profile)?, metrics)?;
    poller.register_monitor(Arc::new(pipeline.clone()));
    let handle = poller.spawn()?;

    scratch.write_file("inbox/a.txt", b"first payload")?;
    scratch.write_file("inbox/b.txt", b"second payload")?;

    let completed_a = inbox.join("completed/a.txt");
    let completed_b = inbox.join("completed/b.txt");
    assert!(
        wait_for(|| completed_a.exists() && completed_b.exists()).await,
        "both files should make it to completed/"
    );
    assert!(!inbox.join("a.txt").exists());
    assert!(!inbox.join("received/a.txt").exists());
    assert!(!inbox.join("working/a.txt").exists());

    handle.shutdown();
    handle.join().await;
    pipeline.close().await;
    Ok(())
}
