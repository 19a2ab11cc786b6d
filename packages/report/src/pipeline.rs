//! The report fetch run.
//!
//! One run: partition the rows into per-page chunks, probe metric
//! permissions against the first chunk, and let a bounded pool of workers
//! claim chunks from a shared cursor. Each chunk is fetched as a range request
//! and a lifetime request in parallel, with retry and fault isolation
//! (see [`crate::isolate`]).
//!
//! All run state lives in a [`RunContext`] created per run, so nothing
//! leaks between runs. Workers are futures polled together by
//! [`join_all`] on the caller's task.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use wildlife_watch_report_models::{
    FetchResult, Metric, ProgressState, ReportRow, ReportTotals, RunStatus,
};

use crate::api::{ApiError, InsightsApi, ObjectsRequest, ObjectsResponse};
use crate::chunking::{Chunk, partition};
use crate::config::ReportConfig;
use crate::isolate::fetch_isolated;
use crate::progress::ProgressTracker;
use crate::query::{lifetime_fields, probe_fields, range_fields};
use crate::shaping::{MergedPayload, merge_responses, to_result};
use crate::totals::compute_totals;

/// Status text of a run with nothing to do.
pub const NO_ROWS_MESSAGE: &str = "No rows to process";

/// Result of one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// How the run settled.
    pub status: RunStatus,
    /// Every published result, in row order. Complete unless cancelled.
    pub results: Vec<FetchResult>,
    /// Metrics the credentials cannot read.
    pub missing_metrics: BTreeSet<Metric>,
    /// Final progress.
    pub progress: ProgressState,
    /// Chunks claimed by workers.
    pub chunks_claimed: usize,
    /// Results kept in the live view.
    pub display_limit: usize,
}

impl RunOutcome {
    fn settled(status: RunStatus, progress: ProgressState, display_limit: usize) -> Self {
        Self {
            status,
            results: Vec::new(),
            missing_metrics: BTreeSet::new(),
            progress,
            chunks_claimed: 0,
            display_limit,
        }
    }

    /// The capped live view: the first `display_limit` results.
    #[must_use]
    pub fn live_view(&self) -> &[FetchResult] {
        live_view(&self.results, self.display_limit)
    }

    /// Whether the live view hides results.
    #[must_use]
    pub fn is_capped(&self) -> bool {
        self.results.len() > self.display_limit
    }

    /// Totals over all results.
    #[must_use]
    pub fn totals(&self) -> ReportTotals {
        compute_totals(&self.results)
    }
}

/// The first `limit` results.
#[must_use]
pub fn live_view(results: &[FetchResult], limit: usize) -> &[FetchResult] {
    &results[..results.len().min(limit)]
}

/// State owned by one run.
struct RunContext<'a> {
    api: &'a dyn InsightsApi,
    config: &'a ReportConfig,
    cancel: &'a CancellationToken,
    tracker: &'a ProgressTracker,
    rows: HashMap<(&'a str, &'a str), &'a ReportRow>,
    chunks: Vec<Chunk>,
    cursor: AtomicUsize,
    results: Mutex<Vec<FetchResult>>,
    missing: BTreeSet<Metric>,
    active_metrics: Vec<Metric>,
    range_fields: Option<String>,
    lifetime_fields: Option<String>,
}

impl RunContext<'_> {
    /// Claims the next chunk, or `None` once the run is cancelled or the
    /// chunks are exhausted. The cursor never moves past the last chunk.
    fn claim_next(&self) -> Option<&Chunk> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let len = self.chunks.len();
        self.cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| (i < len).then_some(i + 1))
            .ok()
            .and_then(|index| self.chunks.get(index))
    }

    fn publish(&self, results: Vec<FetchResult>) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(results);
        self.tracker.chunk_done();
    }

    fn claimed(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

/// Runs the whole pipeline over `rows` for the range `[since, until]`
/// (epoch seconds).
///
/// Never fails: per-row problems become [`FetchResult::Error`]s, an empty
/// input settles as [`RunStatus::Failed`], and cancellation settles as
/// [`RunStatus::Cancelled`] with the results published so far.
pub async fn run_pipeline(
    api: &dyn InsightsApi,
    config: &ReportConfig,
    rows: &[ReportRow],
    since: i64,
    until: i64,
    cancel: &CancellationToken,
    tracker: &ProgressTracker,
) -> RunOutcome {
    let started = Instant::now();

    let chunks = partition(rows, config.chunk_size);
    let Some(sample) = chunks.first().cloned() else {
        tracker.reset(0);
        tracker.finish(
            RunStatus::Failed(NO_ROWS_MESSAGE.to_string()),
            &format!("Error: {NO_ROWS_MESSAGE}"),
        );
        return RunOutcome::settled(
            RunStatus::Failed(NO_ROWS_MESSAGE.to_string()),
            tracker.snapshot(),
            config.display_limit,
        );
    };

    tracker.reset(chunks.len() as u64);
    log::info!(
        "Report run: {} rows in {} chunks, {} workers",
        rows.len(),
        chunks.len(),
        config.concurrency
    );

    tracker.set_text("Checking metric permissions…");
    let missing = match probe_permissions(api, &sample, &config.metrics, cancel).await {
        Ok(missing) => missing,
        Err(_) => return cancelled(tracker, config, BTreeSet::new(), Vec::new(), 0),
    };
    let active_metrics: Vec<Metric> = config
        .metrics
        .iter()
        .copied()
        .filter(|m| !missing.contains(m))
        .collect();

    let ctx = RunContext {
        api,
        config,
        cancel,
        tracker,
        rows: rows
            .iter()
            .map(|row| ((row.page_id.as_str(), row.id.as_str()), row))
            .collect(),
        range_fields: range_fields(&active_metrics, since, until),
        lifetime_fields: lifetime_fields(&active_metrics),
        chunks,
        cursor: AtomicUsize::new(0),
        results: Mutex::new(Vec::new()),
        missing,
        active_metrics,
    };
    tracker.set_text("Processing…");

    let workers = config.concurrency.min(ctx.chunks.len()).max(1);
    join_all((0..workers).map(|worker_id| worker(&ctx, worker_id))).await;

    let claimed = ctx.claimed();
    let RunContext {
        results, missing, ..
    } = ctx;
    let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    sort_by_row_order(&mut results, rows);

    if cancel.is_cancelled() {
        return cancelled(tracker, config, missing, results, claimed);
    }

    let errors = results.iter().filter(|r| r.is_error()).count();
    let mut text = format!(
        "Fetched {} rows ({errors} errors) in {:.1}s",
        results.len(),
        started.elapsed().as_secs_f64()
    );
    if results.len() > config.display_limit {
        text.push_str(&format!(
            ". Showing the first {} of {} results; export for the full set",
            config.display_limit,
            results.len()
        ));
    }
    log::info!("{text}");
    tracker.finish(RunStatus::Completed, &text);

    RunOutcome {
        status: RunStatus::Completed,
        results,
        missing_metrics: missing,
        progress: tracker.snapshot(),
        chunks_claimed: claimed,
        display_limit: config.display_limit,
    }
}

fn cancelled(
    tracker: &ProgressTracker,
    config: &ReportConfig,
    missing: BTreeSet<Metric>,
    results: Vec<FetchResult>,
    claimed: usize,
) -> RunOutcome {
    let progress = tracker.snapshot();
    let text = format!(
        "Cancelled after {}/{} chunks",
        progress.processed, progress.total
    );
    log::info!("{text}");
    tracker.finish(RunStatus::Cancelled, &text);
    RunOutcome {
        status: RunStatus::Cancelled,
        results,
        missing_metrics: missing,
        progress: tracker.snapshot(),
        chunks_claimed: claimed,
        display_limit: config.display_limit,
    }
}

async fn worker(ctx: &RunContext<'_>, worker_id: usize) {
    while let Some(chunk) = ctx.claim_next() {
        match process_chunk(ctx, chunk).await {
            Ok(results) if !ctx.cancel.is_cancelled() => ctx.publish(results),
            Ok(_) | Err(_) => {
                log::debug!("Worker {worker_id} stopping: run cancelled");
                break;
            }
        }
    }
}

/// Fetches one chunk with isolation and shapes its results.
async fn process_chunk(
    ctx: &RunContext<'_>,
    chunk: &Chunk,
) -> Result<Vec<FetchResult>, ApiError> {
    let range = ctx.range_fields.as_deref();
    let lifetime = ctx.lifetime_fields.as_deref();
    let token = chunk.access_token.as_str();

    let outcomes = if range.is_none() && lifetime.is_none() {
        chunk
            .ids
            .iter()
            .map(|id| (id.clone(), Ok(MergedPayload::default())))
            .collect()
    } else {
        fetch_isolated(
            chunk.ids.clone(),
            &ctx.config.retry_policy(),
            ctx.cancel,
            |_, _| ctx.tracker.retry(),
            |ids| fetch_unit(ctx.api, token, ids, range, lifetime, ctx.cancel),
        )
        .await?
    };

    Ok(outcomes
        .into_iter()
        .filter_map(|(id, outcome)| {
            let row = ctx.rows.get(&(chunk.page_id.as_str(), id.as_str()))?;
            Some(to_result(row, outcome, &ctx.active_metrics, &ctx.missing))
        })
        .collect())
}

/// Issues the range and lifetime requests for `ids` in parallel and
/// merges them per ID.
async fn fetch_unit(
    api: &dyn InsightsApi,
    access_token: &str,
    ids: Vec<String>,
    range: Option<&str>,
    lifetime: Option<&str>,
    cancel: &CancellationToken,
) -> Result<BTreeMap<String, Result<MergedPayload, String>>, ApiError> {
    let request = |fields: &str| ObjectsRequest {
        ids: ids.clone(),
        fields: fields.to_string(),
        access_token: access_token.to_string(),
    };
    let range_request = range.map(request);
    let lifetime_request = lifetime.map(request);

    let (range_response, lifetime_response) = tokio::join!(
        fetch_optional(api, range_request.as_ref(), cancel),
        fetch_optional(api, lifetime_request.as_ref(), cancel),
    );

    Ok(merge_responses(range_response?, lifetime_response?))
}

async fn fetch_optional(
    api: &dyn InsightsApi,
    request: Option<&ObjectsRequest>,
    cancel: &CancellationToken,
) -> Result<Option<ObjectsResponse>, ApiError> {
    match request {
        Some(request) => api.fetch_objects(request, cancel).await.map(Some),
        None => Ok(None),
    }
}

/// Issues one single-metric request per metric for the first ID of
/// `sample`, with the chunk's resolved page token, and returns the metrics
/// refused for lack of permission.
///
/// Probe failures that are not permission errors leave the metric
/// enabled.
///
/// # Errors
///
/// Returns [`ApiError::Cancelled`] if `cancel` fires.
pub async fn probe_permissions(
    api: &dyn InsightsApi,
    sample: &Chunk,
    metrics: &[Metric],
    cancel: &CancellationToken,
) -> Result<BTreeSet<Metric>, ApiError> {
    let Some(sample_id) = sample.ids.first() else {
        return Ok(BTreeSet::new());
    };
    let probes = metrics.iter().map(|&metric| async move {
        let request = ObjectsRequest {
            ids: vec![sample_id.clone()],
            fields: probe_fields(metric),
            access_token: sample.access_token.clone(),
        };
        (metric, api.fetch_objects(&request, cancel).await)
    });

    let mut missing = BTreeSet::new();
    for (metric, result) in join_all(probes).await {
        let error = match result {
            Ok(response) => response.get(sample_id).and_then(|p| p.error.clone()).map(|body| {
                ApiError::Api {
                    code: body.code,
                    message: body.message,
                }
            }),
            Err(e) => Some(e),
        };
        match error {
            None => log::debug!("Metric {metric}: readable"),
            Some(e) if e.is_cancelled() => return Err(e),
            Some(e) if e.is_permission_error() => {
                log::info!("Metric {metric}: permission needed ({e})");
                missing.insert(metric);
            }
            Some(e) => log::warn!("Metric {metric}: probe failed, assuming readable: {e}"),
        }
    }

    if cancel.is_cancelled() {
        return Err(ApiError::Cancelled);
    }
    Ok(missing)
}

/// Orders results by the position of their row in `rows`.
fn sort_by_row_order(results: &mut [FetchResult], rows: &[ReportRow]) {
    let mut position: HashMap<(&str, &str), usize> = HashMap::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        position
            .entry((row.page_id.as_str(), row.id.as_str()))
            .or_insert(index);
    }
    results.sort_by_key(|r| {
        position
            .get(&(r.page_id(), r.id()))
            .copied()
            .unwrap_or(usize::MAX)
    });
}
