//! Field expressions for insights requests.

use chrono::{NaiveDate, NaiveTime};
use wildlife_watch_report_models::Metric;

/// Comment count field: summary only, no comment bodies.
pub const COMMENTS_FIELD: &str = "comments.summary(true).limit(0)";

/// Field expression for `metrics` totalled over `[since, until]` (epoch
/// seconds). Metrics without an insights name are ignored. Returns `None`
/// when nothing is left to request.
#[must_use]
pub fn range_fields(metrics: &[Metric], since: i64, until: i64) -> Option<String> {
    let names = insights_names(metrics.iter().copied().filter(|m| m.is_range()));
    (!names.is_empty()).then(|| {
        format!(
            "insights.metric({}).period(total_over_range).since({since}).until({until})",
            names.join(",")
        )
    })
}

/// Field expression for the lifetime request: lifetime insights for the
/// lifetime metrics in `metrics`, plus the comment summary when
/// [`Metric::Comments`] is included. Returns `None` when nothing is left
/// to request.
#[must_use]
pub fn lifetime_fields(metrics: &[Metric]) -> Option<String> {
    let names = insights_names(
        metrics
            .iter()
            .copied()
            .filter(|m| m.is_lifetime() && *m != Metric::Comments),
    );
    let mut parts = Vec::with_capacity(2);
    if !names.is_empty() {
        parts.push(format!("insights.metric({}).period(lifetime)", names.join(",")));
    }
    if metrics.contains(&Metric::Comments) {
        parts.push(COMMENTS_FIELD.to_string());
    }
    (!parts.is_empty()).then(|| parts.join(","))
}

/// The smallest request that tells whether `metric` is readable.
#[must_use]
pub fn probe_fields(metric: Metric) -> String {
    metric.insights_name().map_or_else(
        || COMMENTS_FIELD.to_string(),
        |name| format!("insights.metric({name}).period(lifetime)"),
    )
}

/// Epoch-second bounds covering the whole UTC days `since..=until`.
///
/// Returns `None` when `until` precedes `since`.
#[must_use]
pub fn day_window(since: NaiveDate, until: NaiveDate) -> Option<(i64, i64)> {
    if until < since {
        return None;
    }
    let start = since.and_time(NaiveTime::MIN).and_utc().timestamp();
    let end = until.succ_opt()?.and_time(NaiveTime::MIN).and_utc().timestamp() - 1;
    Some((start, end))
}

fn insights_names(metrics: impl Iterator<Item = Metric>) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = metrics.filter_map(Metric::insights_name).collect();
    names.dedup();
    names
}
