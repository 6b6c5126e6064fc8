//! Synchronous, registration-order event delivery with panic isolation.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::error;

use crate::{EventEnvelope, PollEvent, PollMonitor};

/// Delivers lifecycle events to registered monitors, synchronously and in
/// registration order, on the caller's thread.
///
/// One misbehaving monitor must not abort a poll cycle: every invocation is
/// wrapped in `catch_unwind` and panics are logged instead of propagated.
/// Signalled auto-move failures bypass the lifecycle-event path and reach the
/// dedicated [`PollMonitor`] failure callbacks via the `report_*` methods.
pub struct EventDispatcher {
    poller: String,
    monitors: Vec<Arc<dyn PollMonitor>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    /// Create a dispatcher for the named poller instance with no monitors.
    #[must_use]
    pub fn new(poller: impl Into<String>) -> Self {
        Self {
            poller: poller.into(),
            monitors: Vec::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a monitor. Monitors are invoked in registration order.
    pub fn register(&mut self, monitor: Arc<dyn PollMonitor>) {
        self.monitors.push(monitor);
    }

    /// Name of the poller instance this dispatcher belongs to.
    #[must_use]
    pub fn poller(&self) -> &str {
        &self.poller
    }

    /// Number of registered monitors.
    #[must_use]
    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Wrap `event` in an envelope and deliver it to every monitor in
    /// registration order. Returns the envelope for observability.
    pub fn broadcast(&self, event: PollEvent) -> EventEnvelope {
        let envelope = EventEnvelope {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            poller: self.poller.clone(),
            event,
        };

        for (index, monitor) in self.monitors.iter().enumerate() {
            self.isolate(index, envelope.event.kind(), || {
                Self::deliver(monitor.as_ref(), &envelope.event);
            });
        }

        envelope
    }

    /// Route a delete-failure signal to every monitor's dedicated callback.
    pub fn report_delete_failure(&self, target: &Path) {
        for (index, monitor) in self.monitors.iter().enumerate() {
            self.isolate(index, "delete_target_failed", || {
                monitor.delete_target_failed(target);
            });
        }
    }

    /// Route a move-failure signal to every monitor's dedicated callback.
    pub fn report_move_failure(&self, origin: &Path, destination: &Path) {
        for (index, monitor) in self.monitors.iter().enumerate() {
            self.isolate(index, "move_file_failed", || {
                monitor.move_file_failed(origin, destination);
            });
        }
    }

    fn deliver(monitor: &dyn PollMonitor, event: &PollEvent) {
        match event {
            PollEvent::CycleStarted => monitor.cycle_started(),
            PollEvent::CycleEnded { watermarks } => monitor.cycle_ended(watermarks),
            PollEvent::DirectoryLookupStarted { directory } => {
                monitor.directory_lookup_started(directory);
            }
            PollEvent::DirectoryLookupEnded { directory } => {
                monitor.directory_lookup_ended(directory);
            }
            PollEvent::FileSetFound { directory, files } => {
                monitor.file_set_found(directory, files);
            }
            PollEvent::FileFound { file } => monitor.file_found(file),
            PollEvent::FileMoved {
                origin,
                destination,
            } => monitor.file_moved(origin, destination),
        }
    }

    fn isolate(&self, index: usize, kind: &str, call: impl FnOnce()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(call)) {
            let detail = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(
                poller = %self.poller,
                monitor = index,
                event = kind,
                detail = %detail,
                "poll monitor panicked during dispatch"
            );
        }
    }
}
