#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Types shared by the earnings report pipeline and its front ends.
//!
//! A report run takes [`ReportRow`]s (one per published video), fetches
//! their metrics from the remote insights API, and yields one
//! [`FetchResult`] per row.

use serde::{Deserialize, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// Text shown in place of a metric the credentials cannot read.
pub const PERMISSION_NEEDED: &str = "Permission needed";

/// One unit of report work: a piece of content owned by a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    /// Content (video/post) ID.
    pub id: String,
    /// Owning page ID.
    pub page_id: String,
    /// Page access token used for this row's requests.
    #[serde(default)]
    pub access_token: String,
    /// Video length in seconds, passed through to the output.
    #[serde(default)]
    pub video_length: Option<f64>,
}

/// A page the user token can manage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAccount {
    /// Page ID.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Page access token.
    #[serde(default)]
    pub access_token: String,
}

/// A metric the report can request.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Metric {
    /// Monetization earnings (range and lifetime)
    Earnings,
    /// Video views
    Views,
    /// Unique reach
    Reach,
    /// "Like" reactions
    Likes,
    /// Comment count (lifetime only)
    Comments,
}

impl Metric {
    /// Every metric, in column order.
    pub const ALL: &[Self] = &[
        Self::Earnings,
        Self::Views,
        Self::Reach,
        Self::Likes,
        Self::Comments,
    ];

    /// The insights metric name, or `None` for metrics that are not read
    /// through the insights edge.
    #[must_use]
    pub const fn insights_name(self) -> Option<&'static str> {
        match self {
            Self::Earnings => Some("content_monetization_earnings"),
            Self::Views => Some("post_video_views"),
            Self::Reach => Some("post_impressions_unique"),
            Self::Likes => Some("post_reactions_like_total"),
            Self::Comments => None,
        }
    }

    /// Whether the metric is requested over the report date range.
    #[must_use]
    pub const fn is_range(self) -> bool {
        !matches!(self, Self::Comments)
    }

    /// Whether the metric is part of the lifetime request.
    #[must_use]
    pub const fn is_lifetime(self) -> bool {
        matches!(self, Self::Earnings | Self::Comments)
    }
}

/// One metric cell of a successful result.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum MetricValue {
    /// A numeric value.
    Value(f64),
    /// The API returned nothing usable.
    #[default]
    Missing,
    /// The credentials cannot read this metric.
    PermissionNeeded,
}

impl MetricValue {
    /// The numeric value, if any.
    #[must_use]
    pub const fn as_f64(self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(v),
            Self::Missing | Self::PermissionNeeded => None,
        }
    }

    /// Text form used by tabular export. Missing values are empty.
    #[must_use]
    pub fn to_cell(self) -> String {
        match self {
            Self::Value(v) => v.to_string(),
            Self::Missing => String::new(),
            Self::PermissionNeeded => PERMISSION_NEEDED.to_string(),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => serializer.serialize_f64(*v),
            Self::Missing => serializer.serialize_none(),
            Self::PermissionNeeded => serializer.serialize_str(PERMISSION_NEEDED),
        }
    }
}

/// The metric bundle of one successfully fetched row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetrics {
    /// Earnings over the report range.
    pub earnings: MetricValue,
    /// Lifetime earnings.
    pub earnings_lifetime: MetricValue,
    /// Views over the report range.
    pub views: MetricValue,
    /// Unique reach over the report range.
    pub reach: MetricValue,
    /// Likes over the report range.
    pub likes: MetricValue,
    /// Lifetime comment count.
    pub comments: MetricValue,
}

impl ReportMetrics {
    /// Every metric column paired with its header name.
    #[must_use]
    pub const fn columns(&self) -> [(&'static str, MetricValue); 6] {
        [
            ("earnings", self.earnings),
            ("earnings_lifetime", self.earnings_lifetime),
            ("views", self.views),
            ("reach", self.reach),
            ("likes", self.likes),
            ("comments", self.comments),
        ]
    }
}

/// Per-row outcome of a report run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum FetchResult {
    /// Metrics were fetched.
    #[serde(rename_all = "camelCase")]
    Success {
        /// Content ID.
        id: String,
        /// Owning page ID.
        page_id: String,
        /// Video length in seconds.
        video_length: Option<f64>,
        /// Fetched metrics.
        metrics: ReportMetrics,
    },
    /// The row could not be fetched.
    #[serde(rename_all = "camelCase")]
    Error {
        /// Content ID.
        id: String,
        /// Owning page ID.
        page_id: String,
        /// What went wrong.
        error: String,
    },
}

impl FetchResult {
    /// The content ID.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Success { id, .. } | Self::Error { id, .. } => id,
        }
    }

    /// The owning page ID.
    #[must_use]
    pub fn page_id(&self) -> &str {
        match self {
            Self::Success { page_id, .. } | Self::Error { page_id, .. } => page_id,
        }
    }

    /// Whether this is an error result.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The metrics of a successful result.
    #[must_use]
    pub const fn metrics(&self) -> Option<&ReportMetrics> {
        match self {
            Self::Success { metrics, .. } => Some(metrics),
            Self::Error { .. } => None,
        }
    }
}

/// A snapshot of run progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    /// Chunks resolved so far.
    pub processed: u64,
    /// Chunks in the run.
    pub total: u64,
    /// Request retries so far.
    pub retries: u64,
    /// Human-readable phase or summary.
    pub status_text: String,
}

/// Lifecycle state of a report run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "camelCase")]
pub enum RunStatus {
    /// No run has started.
    #[default]
    Idle,
    /// A run is in progress.
    Running,
    /// The run finished.
    Completed,
    /// The run was cancelled or superseded.
    Cancelled,
    /// The run could not start.
    Failed(String),
}

impl RunStatus {
    /// Whether the run has settled.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed(_))
    }
}

/// Aggregate metrics over the successful rows of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTotals {
    /// Sum of range earnings.
    pub earnings: f64,
    /// Sum of lifetime earnings.
    pub earnings_lifetime: f64,
    /// Sum of range views.
    pub views: f64,
    /// Sum of range reach.
    pub reach: f64,
    /// Sum of range likes.
    pub likes: f64,
    /// Sum of lifetime comments.
    pub comments: f64,
    /// Rows fetched successfully.
    pub succeeded: usize,
    /// Rows that ended in an error.
    pub failed: usize,
}
