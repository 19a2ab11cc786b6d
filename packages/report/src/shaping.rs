//! Turns raw API payloads into flat [`FetchResult`]s.

use std::collections::{BTreeMap, BTreeSet};

use wildlife_watch_report_models::{FetchResult, Metric, MetricValue, ReportMetrics, ReportRow};

use crate::api::{ObjectPayload, ObjectsResponse};

/// The two payloads fetched for one ID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedPayload {
    /// Range-metrics payload.
    pub range: Option<ObjectPayload>,
    /// Lifetime-metrics and comments payload.
    pub lifetime: Option<ObjectPayload>,
}

/// Merges the range and lifetime responses per ID.
///
/// An ID whose payload in either response carries an error maps to that
/// error. IDs absent from both responses are left out.
#[must_use]
pub fn merge_responses(
    range: Option<ObjectsResponse>,
    lifetime: Option<ObjectsResponse>,
) -> BTreeMap<String, Result<MergedPayload, String>> {
    let mut merged: BTreeMap<String, MergedPayload> = BTreeMap::new();
    for (id, payload) in range.into_iter().flatten() {
        merged.entry(id).or_default().range = Some(payload);
    }
    for (id, payload) in lifetime.into_iter().flatten() {
        merged.entry(id).or_default().lifetime = Some(payload);
    }

    merged
        .into_iter()
        .map(|(id, payload)| {
            let error = [&payload.range, &payload.lifetime]
                .into_iter()
                .flatten()
                .find_map(|p| p.error.as_ref())
                .map(|e| e.message.clone());
            match error {
                Some(message) => (id, Err(message)),
                None => (id, Ok(payload)),
            }
        })
        .collect()
}

/// Flattens one ID's payloads into a metric bundle.
///
/// Metrics in `missing` become [`MetricValue::PermissionNeeded`] whatever
/// the payload says; metrics not in `enabled` are left
/// [`MetricValue::Missing`].
#[must_use]
pub fn shape_metrics(
    payload: &MergedPayload,
    enabled: &[Metric],
    missing: &BTreeSet<Metric>,
) -> ReportMetrics {
    let cell = |metric: Metric, value: Option<f64>| {
        if missing.contains(&metric) {
            MetricValue::PermissionNeeded
        } else if !enabled.contains(&metric) {
            MetricValue::Missing
        } else {
            value.map_or(MetricValue::Missing, MetricValue::Value)
        }
    };
    let range = |metric: Metric| {
        let value = payload
            .range
            .as_ref()
            .zip(metric.insights_name())
            .and_then(|(p, name)| p.insight_value(name));
        cell(metric, value)
    };
    let lifetime = payload.lifetime.as_ref();

    #[allow(clippy::cast_precision_loss)]
    let comments = lifetime.and_then(ObjectPayload::comment_count).map(|c| c as f64);

    ReportMetrics {
        earnings: range(Metric::Earnings),
        earnings_lifetime: cell(
            Metric::Earnings,
            lifetime.and_then(|p| {
                Metric::Earnings
                    .insights_name()
                    .and_then(|name| p.insight_value(name))
            }),
        ),
        views: range(Metric::Views),
        reach: range(Metric::Reach),
        likes: range(Metric::Likes),
        comments: cell(Metric::Comments, comments),
    }
}

/// Builds the result for `row` from its isolated outcome.
#[must_use]
pub fn to_result(
    row: &ReportRow,
    outcome: Result<MergedPayload, String>,
    enabled: &[Metric],
    missing: &BTreeSet<Metric>,
) -> FetchResult {
    match outcome {
        Ok(payload) => FetchResult::Success {
            id: row.id.clone(),
            page_id: row.page_id.clone(),
            video_length: row.video_length,
            metrics: shape_metrics(&payload, enabled, missing),
        },
        Err(error) => FetchResult::Error {
            id: row.id.clone(),
            page_id: row.page_id.clone(),
            error,
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(value: serde_json::Value) -> ObjectsResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn merges_range_and_lifetime_per_id() {
        let range = response(json!({
            "v1": {"insights": {"data": [
                {"name": "content_monetization_earnings", "values": [{"value": 1.5}]},
                {"name": "post_video_views", "values": [{"value": 300}]}
            ]}},
            "v2": {"error": {"message": "Unsupported get request", "code": 100}}
        }));
        let lifetime = response(json!({
            "v1": {
                "insights": {"data": [
                    {"name": "content_monetization_earnings", "values": [{"value": 9.0}]}
                ]},
                "comments": {"summary": {"total_count": 4}}
            },
            "v2": {"comments": {"summary": {"total_count": 0}}}
        }));

        let merged = merge_responses(Some(range), Some(lifetime));
        assert_eq!(merged["v2"], Err("Unsupported get request".to_string()));

        let payload = merged["v1"].as_ref().unwrap();
        let metrics = shape_metrics(payload, Metric::ALL, &BTreeSet::new());
        assert_eq!(metrics.earnings, MetricValue::Value(1.5));
        assert_eq!(metrics.earnings_lifetime, MetricValue::Value(9.0));
        assert_eq!(metrics.views, MetricValue::Value(300.0));
        assert_eq!(metrics.reach, MetricValue::Missing);
        assert_eq!(metrics.comments, MetricValue::Value(4.0));
    }

    #[test]
    fn missing_metrics_always_get_the_sentinel() {
        let range = response(json!({
            "v1": {"insights": {"data": [
                {"name": "post_video_views", "values": [{"value": 300}]}
            ]}}
        }));
        let merged = merge_responses(Some(range), None);
        let missing: BTreeSet<Metric> = [Metric::Earnings, Metric::Views].into();
        let metrics = shape_metrics(merged["v1"].as_ref().unwrap(), Metric::ALL, &missing);
        assert_eq!(metrics.earnings, MetricValue::PermissionNeeded);
        assert_eq!(metrics.earnings_lifetime, MetricValue::PermissionNeeded);
        assert_eq!(metrics.views, MetricValue::PermissionNeeded);
        assert_eq!(metrics.comments, MetricValue::Missing);
    }

    #[test]
    fn error_outcomes_keep_row_identity() {
        let row = ReportRow {
            id: "v9".to_string(),
            page_id: "p1".to_string(),
            access_token: "t".to_string(),
            video_length: Some(12.0),
        };
        let result = to_result(&row, Err("boom".to_string()), Metric::ALL, &BTreeSet::new());
        assert_eq!(
            result,
            FetchResult::Error {
                id: "v9".to_string(),
                page_id: "p1".to_string(),
                error: "boom".to_string(),
            }
        );
    }
}
