//! Run progress tracking.
//!
//! [`ProgressTracker`] is the single merge point for a run's
//! `{processed, total, retries, status_text}` state. Workers update it
//! through atomics and a short text lock, so it stays consistent on a
//! multi-threaded runtime. Every update is mirrored to a
//! [`ProgressCallback`] so front ends (e.g. `indicatif` bars) can render
//! it without knowing about the pipeline, until the tracker is detached
//! because a newer run took over the sink.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use wildlife_watch_report_models::{ProgressState, RunStatus};

/// Where a run's progress is rendered.
///
/// One sink serves every worker of a run, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Number of chunks the run will resolve.
    fn set_total(&self, total: u64);

    /// Resolved chunk count, absolute.
    fn set_position(&self, pos: u64);

    /// `delta` more chunks resolved.
    fn inc(&self, delta: u64);

    /// Current phase or status line.
    fn set_message(&self, text: &str);

    /// The run settled; `text` is its summary.
    fn finish(&self, text: &str);

    /// The work is over and nothing should stay on screen.
    fn finish_and_clear(&self);
}

/// Discards every update. Used by tests and headless callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _text: &str) {}
    fn finish(&self, _text: &str) {}
    fn finish_and_clear(&self) {}
}

/// A [`NullProgress`] ready to hand to a [`ProgressTracker`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Progress and lifecycle state of one run.
pub struct ProgressTracker {
    processed: AtomicU64,
    total: AtomicU64,
    retries: AtomicU64,
    status_text: Mutex<String>,
    status: Mutex<RunStatus>,
    sink: Arc<dyn ProgressCallback>,
    detached: AtomicBool,
}

impl ProgressTracker {
    /// Creates an idle tracker that mirrors updates to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressCallback>) -> Self {
        Self {
            processed: AtomicU64::new(0),
            total: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            status_text: Mutex::new(String::new()),
            status: Mutex::new(RunStatus::Idle),
            sink,
            detached: AtomicBool::new(false),
        }
    }

    /// Stops mirroring updates to the sink. The tracker's own state keeps
    /// updating; a newer run owns the sink from here on.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    /// Whether [`Self::detach`] was called.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn sink(&self) -> Option<&dyn ProgressCallback> {
        (!self.is_detached()).then_some(self.sink.as_ref())
    }

    /// Starts a run: zeroes the counters, fixes the chunk total, and marks
    /// the run as running.
    pub fn reset(&self, total: u64) {
        self.processed.store(0, Ordering::SeqCst);
        self.retries.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.set_status(RunStatus::Running);
        if let Some(sink) = self.sink() {
            sink.set_total(total);
            sink.set_position(0);
        }
        self.set_text("Processing…");
    }

    /// Records one resolved chunk.
    pub fn chunk_done(&self) {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        if let Some(sink) = self.sink() {
            sink.inc(1);
        }
        self.set_text(&format!("Processing… {processed}/{total} chunks"));
    }

    /// Records one request retry.
    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    /// Replaces the status text.
    pub fn set_text(&self, text: &str) {
        *self.status_text.lock().unwrap_or_else(PoisonError::into_inner) = text.to_string();
        if let Some(sink) = self.sink() {
            sink.set_message(text);
        }
    }

    /// Settles the run with `status` and a final message.
    pub fn finish(&self, status: RunStatus, text: &str) {
        self.set_status(status);
        *self.status_text.lock().unwrap_or_else(PoisonError::into_inner) = text.to_string();
        if let Some(sink) = self.sink() {
            sink.finish(text);
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current counters and text.
    #[must_use]
    pub fn snapshot(&self) -> ProgressState {
        ProgressState {
            processed: self.processed.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
            retries: self.retries.load(Ordering::SeqCst),
            status_text: self
                .status_text
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    fn set_status(&self, status: RunStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        position: AtomicU64,
        messages: Mutex<Vec<String>>,
    }

    impl ProgressCallback for Recorder {
        fn set_total(&self, _total: u64) {}
        fn set_position(&self, pos: u64) {
            self.position.store(pos, Ordering::SeqCst);
        }
        fn inc(&self, delta: u64) {
            self.position.fetch_add(delta, Ordering::SeqCst);
        }
        fn set_message(&self, text: &str) {
            self.messages.lock().unwrap().push(text.to_string());
        }
        fn finish(&self, text: &str) {
            self.messages.lock().unwrap().push(text.to_string());
        }
        fn finish_and_clear(&self) {}
    }

    #[test]
    fn reset_starts_a_fresh_run() {
        let tracker = ProgressTracker::new(null_progress());
        tracker.reset(3);
        tracker.chunk_done();
        tracker.retry();
        tracker.reset(5);
        let state = tracker.snapshot();
        assert_eq!((state.processed, state.total, state.retries), (0, 5, 0));
        assert_eq!(tracker.status(), RunStatus::Running);
    }

    #[test]
    fn updates_are_mirrored_to_the_sink() {
        let sink = Arc::new(Recorder::default());
        let tracker = ProgressTracker::new(sink.clone());
        tracker.reset(2);
        tracker.chunk_done();
        tracker.chunk_done();
        tracker.finish(RunStatus::Completed, "Done");

        assert_eq!(sink.position.load(Ordering::SeqCst), 2);
        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages.last().map(String::as_str), Some("Done"));
        assert!(messages.iter().any(|m| m.ends_with("2/2 chunks")));
        assert_eq!(tracker.snapshot().status_text, "Done");
        assert_eq!(tracker.status(), RunStatus::Completed);
    }

    #[test]
    fn detached_tracker_stops_reaching_the_sink() {
        let sink = Arc::new(Recorder::default());
        let tracker = ProgressTracker::new(sink.clone());
        tracker.reset(2);
        tracker.detach();
        tracker.chunk_done();
        tracker.finish(RunStatus::Cancelled, "Cancelled");

        assert_eq!(sink.position.load(Ordering::SeqCst), 0);
        assert!(!sink.messages.lock().unwrap().iter().any(|m| m == "Cancelled"));
        assert_eq!(tracker.snapshot().processed, 1);
        assert_eq!(tracker.status(), RunStatus::Cancelled);
    }
}
