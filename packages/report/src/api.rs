//! Remote insights API contract.
//!
//! The pipeline only talks to the API through [`InsightsApi`], so tests
//! can drive it with a scripted double. [`crate::graph::GraphClient`] is
//! the HTTP implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use wildlife_watch_report_models::PageAccount;

/// Error code the API uses for missing permissions.
const PERMISSION_CODE: i64 = 10;

/// Range of error codes reserved for permission failures.
const PERMISSION_CODE_RANGE: std::ops::RangeInclusive<i64> = 200..=299;

/// A batched multi-ID read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectsRequest {
    /// IDs to read.
    pub ids: Vec<String>,
    /// Field expression.
    pub fields: String,
    /// Access token for every ID in the batch.
    pub access_token: String,
}

/// Response to an [`ObjectsRequest`]: one payload per returned ID.
pub type ObjectsResponse = BTreeMap<String, ObjectPayload>;

/// The payload for one ID.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ObjectPayload {
    /// Requested insights.
    #[serde(default)]
    pub insights: Option<InsightsEnvelope>,
    /// Comment summary.
    #[serde(default)]
    pub comments: Option<CommentsEnvelope>,
    /// Per-ID error.
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

impl ObjectPayload {
    /// The first value of the insight named `name`.
    #[must_use]
    pub fn insight_value(&self, name: &str) -> Option<f64> {
        self.insights
            .as_ref()?
            .data
            .iter()
            .find(|entry| entry.name == name)?
            .values
            .first()
            .and_then(|v| numeric(&v.value))
    }

    /// The total comment count.
    #[must_use]
    pub fn comment_count(&self) -> Option<u64> {
        self.comments.as_ref()?.summary.as_ref()?.total_count
    }
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// `insights` edge body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InsightsEnvelope {
    /// One entry per metric.
    #[serde(default)]
    pub data: Vec<InsightEntry>,
}

/// One metric of the `insights` edge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InsightEntry {
    /// Metric name.
    pub name: String,
    /// Aggregation period.
    #[serde(default)]
    pub period: Option<String>,
    /// Values; the pipeline reads the first.
    #[serde(default)]
    pub values: Vec<InsightValue>,
}

/// One value of an insight.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InsightValue {
    /// Raw value.
    #[serde(default)]
    pub value: serde_json::Value,
}

/// `comments` edge body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommentsEnvelope {
    /// Summary block (requested with `summary(true)`).
    #[serde(default)]
    pub summary: Option<CommentsSummary>,
}

/// Comment summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommentsSummary {
    /// Total comments.
    #[serde(default)]
    pub total_count: Option<u64>,
}

/// API error object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Numeric error code.
    #[serde(default)]
    pub code: Option<i64>,
}

/// Top-level error envelope of a failed call.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// Where to read the next page of managed accounts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountsCursor {
    /// The first page, authorized by a user token.
    Start {
        /// User access token.
        access_token: String,
    },
    /// An absolute `paging.next` URL.
    Next(String),
}

/// One page of managed accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccountsPage {
    /// Accounts on this page.
    #[serde(default)]
    pub data: Vec<PageAccount>,
    /// Pagination links.
    #[serde(default)]
    pub paging: Option<Paging>,
}

/// Pagination links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Paging {
    /// URL of the next page, absent on the last page.
    #[serde(default)]
    pub next: Option<String>,
}

/// Errors from the remote API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status without a decodable error body.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// The API reported an error.
    #[error("{message}")]
    Api {
        /// Numeric error code, if given.
        code: Option<i64>,
        /// Error message.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The run was cancelled.
    #[error("Cancelled")]
    Cancelled,
}

impl ApiError {
    /// Decodes a failed response body, falling back to [`Self::Status`].
    #[must_use]
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => Self::Api {
                code: envelope.error.code,
                message: envelope.error.message,
            },
            Err(_) => Self::Status {
                status,
                body: body.chars().take(500).collect(),
            },
        }
    }

    /// Whether this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the API rejected the call for lack of permission.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        match self {
            Self::Api { code, message } => {
                code.is_some_and(|c| c == PERMISSION_CODE || PERMISSION_CODE_RANGE.contains(&c))
                    || message.to_ascii_lowercase().contains("permission")
            }
            _ => false,
        }
    }

    /// The IDs of `unit` that the error message names, in `unit` order.
    ///
    /// A non-empty result means the failure can be pinned on those IDs
    /// instead of the whole batch.
    #[must_use]
    pub fn attributed_ids(&self, unit: &[String]) -> Vec<String> {
        let Self::Api { message, .. } = self else {
            return Vec::new();
        };
        let tokens: Vec<&str> = message
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
            .collect();
        unit.iter()
            .filter(|id| tokens.contains(&id.as_str()))
            .cloned()
            .collect()
    }
}

/// Operations the report pipeline needs from the remote API.
#[async_trait]
pub trait InsightsApi: Send + Sync {
    /// Reads `request.fields` for every ID in `request.ids`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the whole call fails or `cancel` fires
    /// first. Per-ID failures are reported in the payload instead.
    async fn fetch_objects(
        &self,
        request: &ObjectsRequest,
        cancel: &CancellationToken,
    ) -> Result<ObjectsResponse, ApiError>;

    /// Reads one page of the accounts the token can manage.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the call fails or `cancel` fires first.
    async fn fetch_accounts_page(
        &self,
        cursor: &AccountsCursor,
        cancel: &CancellationToken,
    ) -> Result<AccountsPage, ApiError>;
}

/// Lists every page `access_token` can manage, following `paging.next`
/// until it is absent.
///
/// # Errors
///
/// Returns [`ApiError`] if any page fetch fails.
pub async fn list_pages(
    api: &dyn InsightsApi,
    access_token: &str,
    cancel: &CancellationToken,
) -> Result<Vec<PageAccount>, ApiError> {
    let mut cursor = AccountsCursor::Start {
        access_token: access_token.to_string(),
    };
    let mut pages = Vec::new();
    let mut page_num: u32 = 0;

    loop {
        let page = api.fetch_accounts_page(&cursor, cancel).await?;
        let count = page.data.len();
        pages.extend(page.data);

        log::info!("Accounts page {page_num}: {count} pages (total: {})", pages.len());

        match page.paging.and_then(|p| p.next) {
            Some(next) => cursor = AccountsCursor::Next(next),
            None => break,
        }

        page_num += 1;
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn api(code: Option<i64>, message: &str) -> ApiError {
        ApiError::Api {
            code,
            message: message.to_string(),
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn classifies_permission_errors() {
        assert!(api(Some(10), "Application does not have capability").is_permission_error());
        assert!(api(Some(200), "Requires pages_read_engagement").is_permission_error());
        assert!(api(None, "Missing Permission for metric").is_permission_error());
        assert!(!api(Some(100), "Invalid parameter").is_permission_error());
        assert!(!ApiError::Cancelled.is_permission_error());
    }

    #[test]
    fn attributes_only_exact_id_tokens() {
        let unit = ids(&["123", "456", "12"]);
        let err = api(Some(100), "Object with ID '123' does not exist (see 4567)");
        assert_eq!(err.attributed_ids(&unit), ids(&["123"]));
        assert!(api(Some(1), "Unknown error").attributed_ids(&unit).is_empty());
        let status = ApiError::Status { status: 500, body: "123".to_string() };
        assert!(status.attributed_ids(&unit).is_empty());
    }

    #[test]
    fn decodes_error_bodies() {
        let body = json!({"error": {"message": "(#10) Not allowed", "code": 10}}).to_string();
        let err = ApiError::from_body(400, &body);
        assert!(err.is_permission_error());
        assert!(matches!(ApiError::from_body(502, "<html>"), ApiError::Status { status: 502, .. }));
    }

    #[test]
    fn reads_payload_values() {
        let payload: ObjectPayload = serde_json::from_value(json!({
            "insights": {"data": [
                {"name": "post_video_views", "period": "lifetime", "values": [{"value": 42}]},
                {"name": "content_monetization_earnings", "values": [{"value": "3.25"}]}
            ]},
            "comments": {"data": [], "summary": {"total_count": 7}},
            "id": "v1"
        }))
        .unwrap();
        assert_eq!(payload.insight_value("post_video_views"), Some(42.0));
        assert_eq!(payload.insight_value("content_monetization_earnings"), Some(3.25));
        assert_eq!(payload.insight_value("post_impressions_unique"), None);
        assert_eq!(payload.comment_count(), Some(7));
    }

    struct PagedAccounts {
        seen: Mutex<Vec<AccountsCursor>>,
    }

    #[async_trait]
    impl InsightsApi for PagedAccounts {
        async fn fetch_objects(
            &self,
            _request: &ObjectsRequest,
            _cancel: &CancellationToken,
        ) -> Result<ObjectsResponse, ApiError> {
            Ok(ObjectsResponse::new())
        }

        async fn fetch_accounts_page(
            &self,
            cursor: &AccountsCursor,
            _cancel: &CancellationToken,
        ) -> Result<AccountsPage, ApiError> {
            self.seen.lock().unwrap().push(cursor.clone());
            let page = match cursor {
                AccountsCursor::Start { .. } => json!({
                    "data": [{"id": "p1", "name": "Trail cams", "access_token": "t1"}],
                    "paging": {"next": "https://api/next-0"}
                }),
                AccountsCursor::Next(url) if url.ends_with("next-0") => json!({
                    "data": [],
                    "paging": {"next": "https://api/next-1"}
                }),
                AccountsCursor::Next(url) if url.ends_with("next-1") => json!({
                    "data": [{"id": "p2", "name": "River cams", "access_token": "t2"}],
                    "paging": {}
                }),
                AccountsCursor::Next(_) => json!({"data": []}),
            };
            Ok(serde_json::from_value(page)?)
        }
    }

    #[tokio::test]
    async fn list_pages_follows_next_links_across_empty_pages() {
        let api = PagedAccounts { seen: Mutex::new(Vec::new()) };
        let pages = list_pages(&api, "user-token", &CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2"]);
        assert_eq!(api.seen.lock().unwrap().len(), 3);
    }
}
