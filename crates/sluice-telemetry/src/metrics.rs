//! Prometheus-backed metrics registry.
//!
//! # Design
//! - Encapsulates collector registration so the public API stays small.
//! - Exposes the minimal set of counters relevant to the poller and the
//!   processing pipeline; exposition is left to the embedder via `render`.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::TelemetryResult;

/// Prometheus-backed metrics registry shared across sluice components.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    poll_cycles_total: IntCounter,
    events_emitted_total: IntCounterVec,
    files_moved_total: IntCounter,
    automove_failures_total: IntCounterVec,
    pipeline_tasks_total: IntCounterVec,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let poll_cycles_total =
            IntCounter::with_opts(Opts::new("poll_cycles_total", "Polling cycles completed"))?;
        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Lifecycle events emitted by type"),
            &["type"],
        )?;
        let files_moved_total = IntCounter::with_opts(Opts::new(
            "files_moved_total",
            "Files renamed into quarantine directories",
        ))?;
        let automove_failures_total = IntCounterVec::new(
            Opts::new(
                "automove_failures_total",
                "Signalled auto-move failures by kind",
            ),
            &["kind"],
        )?;
        let pipeline_tasks_total = IntCounterVec::new(
            Opts::new(
                "pipeline_tasks_total",
                "Processing pipeline task results by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(poll_cycles_total.clone()))?;
        registry.register(Box::new(events_emitted_total.clone()))?;
        registry.register(Box::new(files_moved_total.clone()))?;
        registry.register(Box::new(automove_failures_total.clone()))?;
        registry.register(Box::new(pipeline_tasks_total.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                poll_cycles_total,
                events_emitted_total,
                files_moved_total,
                automove_failures_total,
                pipeline_tasks_total,
            }),
        })
    }

    /// Increment the completed-cycle counter.
    pub fn inc_cycle(&self) {
        self.inner.poll_cycles_total.inc();
    }

    /// Increment the emitted-event counter for the given event kind.
    pub fn inc_event(&self, kind: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Increment the quarantine-move counter.
    pub fn inc_file_moved(&self) {
        self.inner.files_moved_total.inc();
    }

    /// Increment the auto-move failure counter (`kind` is `delete` or `move`).
    pub fn inc_automove_failure(&self, kind: &str) {
        self.inner
            .automove_failures_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Increment the pipeline task counter (`outcome` is `completed` or
    /// `failed`).
    pub fn inc_pipeline_task(&self, outcome: &str) {
        self.inner
            .pipeline_tasks_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Render the registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|source| crate::TelemetryError::Exposition { source })
    }
}
