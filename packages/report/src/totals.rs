//! Aggregate totals over a run's results.

use wildlife_watch_report_models::{FetchResult, MetricValue, ReportTotals};

/// Sums each metric over successful rows and counts outcomes. Sentinel
/// and missing values contribute nothing.
#[must_use]
pub fn compute_totals(results: &[FetchResult]) -> ReportTotals {
    let add = |total: &mut f64, value: MetricValue| {
        if let Some(v) = value.as_f64() {
            *total += v;
        }
    };

    results
        .iter()
        .fold(ReportTotals::default(), |mut totals, result| {
            match result.metrics() {
                Some(m) => {
                    totals.succeeded += 1;
                    add(&mut totals.earnings, m.earnings);
                    add(&mut totals.earnings_lifetime, m.earnings_lifetime);
                    add(&mut totals.views, m.views);
                    add(&mut totals.reach, m.reach);
                    add(&mut totals.likes, m.likes);
                    add(&mut totals.comments, m.comments);
                }
                None => totals.failed += 1,
            }
            totals
        })
}
