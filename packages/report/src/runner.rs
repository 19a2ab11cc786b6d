//! Run coordination: at most one active run, superseded or cancelled
//! through its token.
//!
//! Starting a run cancels the token of whatever run is in flight, detaches
//! its tracker from the shared progress sink, and gives the new run a
//! fresh token and tracker, so nothing leaks between runs. The last run's
//! tracker is kept after it settles so callers can still read its final
//! progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use wildlife_watch_report_models::{ProgressState, ReportRow, RunStatus};

use crate::api::InsightsApi;
use crate::config::ReportConfig;
use crate::pipeline::{RunOutcome, run_pipeline};
use crate::progress::{ProgressCallback, ProgressTracker};

struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
    tracker: Arc<ProgressTracker>,
}

/// Owns the current run of the report pipeline.
pub struct ReportRunner {
    api: Arc<dyn InsightsApi>,
    config: ReportConfig,
    sink: Arc<dyn ProgressCallback>,
    active: Mutex<Option<ActiveRun>>,
    next_id: AtomicU64,
}

impl ReportRunner {
    #[must_use]
    pub fn new(
        api: Arc<dyn InsightsApi>,
        config: ReportConfig,
        sink: Arc<dyn ProgressCallback>,
    ) -> Self {
        Self {
            api,
            config,
            sink,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// The pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Runs the pipeline over `rows` for `[since, until]` (epoch seconds),
    /// cancelling any run already in flight.
    ///
    /// A run cancelled through [`Self::cancel`] keeps the results it
    /// published; a run superseded by a newer one returns none.
    pub async fn run(&self, rows: &[ReportRow], since: i64, until: i64) -> RunOutcome {
        let (id, cancel, tracker) = self.begin();
        log::info!("Starting report run {id}");
        let mut outcome = run_pipeline(
            self.api.as_ref(),
            &self.config,
            rows,
            since,
            until,
            &cancel,
            &tracker,
        )
        .await;

        if self.is_superseded(id) {
            log::info!(
                "Report run {id} was superseded; discarding {} results",
                outcome.results.len()
            );
            outcome.results.clear();
        } else {
            log::info!("Report run {id} settled: {:?}", outcome.status);
        }
        outcome
    }

    fn is_superseded(&self, id: u64) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|run| run.id != id)
    }

    fn begin(&self) -> (u64, CancellationToken, Arc<ProgressTracker>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let tracker = Arc::new(ProgressTracker::new(Arc::clone(&self.sink)));

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            if !previous.tracker.status().is_terminal() {
                log::info!("Run {id} supersedes run {}", previous.id);
            }
            previous.tracker.detach();
            previous.cancel.cancel();
        }
        *active = Some(ActiveRun {
            id,
            cancel: cancel.clone(),
            tracker: Arc::clone(&tracker),
        });

        (id, cancel, tracker)
    }

    /// Cancels the current run, if any. Returns whether a run was still
    /// in flight.
    pub fn cancel(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.as_ref().is_some_and(|run| {
            let in_flight = !run.tracker.status().is_terminal();
            if in_flight {
                log::info!("Cancelling report run {}", run.id);
            }
            run.cancel.cancel();
            in_flight
        })
    }

    /// The current or last run's cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|run| run.cancel.clone())
    }

    /// Progress of the current or last run.
    #[must_use]
    pub fn progress(&self) -> Option<ProgressState> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|run| run.tracker.snapshot())
    }

    /// Status of the current or last run; [`RunStatus::Idle`] before the
    /// first run.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(RunStatus::Idle, |run| run.tracker.status())
    }

    /// Whether a run is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status() == RunStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::api::{
        AccountsCursor, AccountsPage, ApiError, ObjectPayload, ObjectsRequest, ObjectsResponse,
    };
    use crate::progress::null_progress;

    /// Answers immediately, except for requests authorized by `"slow"`,
    /// which wait for cancellation.
    struct GatedApi;

    #[async_trait]
    impl InsightsApi for GatedApi {
        async fn fetch_objects(
            &self,
            request: &ObjectsRequest,
            cancel: &CancellationToken,
        ) -> Result<ObjectsResponse, ApiError> {
            if request.access_token == "slow" {
                cancel.cancelled().await;
                return Err(ApiError::Cancelled);
            }
            Ok(request
                .ids
                .iter()
                .map(|id| (id.clone(), ObjectPayload::default()))
                .collect())
        }

        async fn fetch_accounts_page(
            &self,
            _cursor: &AccountsCursor,
            _cancel: &CancellationToken,
        ) -> Result<AccountsPage, ApiError> {
            Ok(AccountsPage::default())
        }
    }

    fn rows(token: &str) -> Vec<ReportRow> {
        vec![ReportRow {
            id: "v1".to_string(),
            page_id: "p1".to_string(),
            access_token: token.to_string(),
            video_length: None,
        }]
    }

    /// Records the sink calls that matter for ordering.
    #[derive(Default)]
    struct EventLog(Mutex<Vec<String>>);

    impl EventLog {
        fn push(&self, event: String) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl ProgressCallback for EventLog {
        fn set_total(&self, total: u64) {
            self.push(format!("set_total {total}"));
        }
        fn set_position(&self, _pos: u64) {}
        fn inc(&self, _delta: u64) {}
        fn set_message(&self, _text: &str) {}
        fn finish(&self, text: &str) {
            self.push(format!("finish {text}"));
        }
        fn finish_and_clear(&self) {}
    }

    fn runner() -> ReportRunner {
        let config = ReportConfig {
            base_delay_ms: 0,
            ..ReportConfig::default()
        };
        ReportRunner::new(Arc::new(GatedApi), config, null_progress())
    }

    #[tokio::test]
    async fn idle_before_first_run() {
        let runner = runner();
        assert_eq!(runner.status(), RunStatus::Idle);
        assert!(runner.progress().is_none());
        assert!(!runner.cancel());
    }

    #[tokio::test]
    async fn new_run_supersedes_the_active_one() {
        let runner = runner();
        let slow = rows("slow");
        let fast = rows("fast");

        let (first, second) = tokio::join!(runner.run(&slow, 0, 1), async {
            tokio::task::yield_now().await;
            runner.run(&fast, 0, 1).await
        });

        assert_eq!(first.status, RunStatus::Cancelled);
        assert!(first.results.is_empty());
        assert_eq!(second.status, RunStatus::Completed);
        assert_eq!(second.results.len(), 1);
        assert_eq!(runner.status(), RunStatus::Completed);
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn superseded_run_leaves_the_shared_sink_alone() {
        let events = Arc::new(EventLog::default());
        let config = ReportConfig {
            base_delay_ms: 0,
            chunk_size: 1,
            ..ReportConfig::default()
        };
        let runner = ReportRunner::new(Arc::new(GatedApi), config, events.clone());
        let slow = rows("slow");
        let fast: Vec<ReportRow> = (1..=3)
            .map(|i| ReportRow {
                id: format!("v{i}"),
                page_id: "p1".to_string(),
                access_token: "fast".to_string(),
                video_length: None,
            })
            .collect();

        let (first, second) = tokio::join!(runner.run(&slow, 0, 1), async {
            tokio::task::yield_now().await;
            runner.run(&fast, 0, 1).await
        });
        assert_eq!(first.status, RunStatus::Cancelled);
        assert_eq!(second.status, RunStatus::Completed);

        let events = events.0.lock().unwrap();
        assert_eq!(events.len(), 3, "{events:?}");
        assert_eq!(events[0], "set_total 1");
        assert_eq!(events[1], "set_total 3");
        assert!(events[2].starts_with("finish Fetched 3 rows"), "{events:?}");
    }

    #[tokio::test]
    async fn cancel_settles_the_active_run() {
        let runner = runner();
        let slow = rows("slow");

        let (outcome, was_running) = tokio::join!(runner.run(&slow, 0, 1), async {
            tokio::task::yield_now().await;
            assert!(runner.is_running());
            runner.cancel()
        });

        assert!(was_running);
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(runner.status(), RunStatus::Cancelled);
        assert!(runner.cancellation_token().unwrap().is_cancelled());
    }
}
