#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Detection record, capture event, and highlight view-model types.
//!
//! A camera trap produces one [`CaptureEvent`] per photo or clip. The
//! ingestion pipeline attaches one [`DetectionRecord`] per species seen in
//! that capture. Everything else in this crate is derived from those two
//! documents on request and never written back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Species label used when no species-like field resolves.
pub const UNKNOWN_SPECIES: &str = "Unknown";

/// Gated detection collection read for the highlight board.
pub const DEFAULT_HIGHLIGHT_COLLECTION: &str = "highlights";

/// Ungated detection collection read for the sighting view.
pub const DEFAULT_SIGHTING_COLLECTION: &str = "detections";

/// The kind of media a capture produced.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MediaType {
    /// Still photo
    #[default]
    Image,
    /// Video clip
    Video,
}

/// A "highlight of the day" category.
///
/// The declaration order is the display priority used when two categories
/// point at the same capture.
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
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum HighlightCategory {
    /// Largest normalized bounding-box area
    BiggestBoundingBox,
    /// Highest individual count
    MostAnimals,
    /// Smallest distance from the frame center
    MostCentered,
    /// Best video clip (count first, recency second)
    Video,
}

impl HighlightCategory {
    /// All categories in display priority order.
    pub const ALL: &[Self] = &[
        Self::BiggestBoundingBox,
        Self::MostAnimals,
        Self::MostCentered,
        Self::Video,
    ];

    /// Human-readable title for the highlight board.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::BiggestBoundingBox => "Biggest bounding box",
            Self::MostAnimals => "Most animals",
            Self::MostCentered => "Most centered",
            Self::Video => "Best video",
        }
    }
}

/// A half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new range.
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The UTC calendar day containing `at`.
    #[must_use]
    pub fn day_of(at: DateTime<Utc>) -> Self {
        let start = at
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(at, |naive| naive.and_utc());
        Self {
            start,
            end: start + chrono::Duration::days(1),
        }
    }

    /// Resolves optional bounds: a missing `from` means the start of the
    /// UTC day of `now`, a missing `to` means one day after the start.
    /// Returns `None` for an empty or inverted window.
    #[must_use]
    pub fn from_bounds(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let start = from.unwrap_or_else(|| Self::day_of(now).start);
        let end = to.unwrap_or(start + chrono::Duration::days(1));
        (start < end).then_some(Self { start, end })
    }

    /// Whether `at` falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// One bounding box from the detector's top-N list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopBox {
    /// Normalized distance from the box center to the frame center.
    /// `None` when the stored value was missing or not a number.
    pub center_dist: Option<f64>,
}

/// One species' observation within a single capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    /// Document ID.
    pub id: String,
    /// Full document path in the store.
    pub path: String,
    /// Path of the owning [`CaptureEvent`].
    pub parent: Option<String>,
    /// Resolved species label ([`UNKNOWN_SPECIES`] if nothing resolved).
    pub species: String,
    /// Number of individuals detected.
    pub count: Option<u64>,
    /// Highest detector confidence for this species in the capture.
    pub max_confidence: Option<f64>,
    /// Largest normalized bounding-box area.
    pub max_area: Option<f64>,
    /// Top boxes; `None` when the field is absent or not a list.
    pub top_boxes: Option<Vec<TopBox>>,
    /// When the detection was written.
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the species-correction workflow.
    #[serde(default)]
    pub corrected: bool,
    /// The raw document fields, kept for field probing.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// One media capture that owns one or more [`DetectionRecord`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEvent {
    /// Document ID.
    pub id: String,
    /// Full document path in the store.
    pub path: String,
    /// Photo or video.
    pub media_type: MediaType,
    /// Camera location identifier.
    pub location_id: Option<String>,
    /// Annotated preview image.
    pub preview_url: Option<String>,
    /// Preview with detector debug overlays.
    pub debug_preview_url: Option<String>,
    /// Unprocessed preview image.
    pub raw_preview_url: Option<String>,
    /// Annotated media (the clip for videos).
    pub media_url: Option<String>,
    /// Clip with detector debug overlays.
    pub debug_video_url: Option<String>,
    /// Unprocessed media.
    pub raw_media_url: Option<String>,
    /// When the capture happened.
    pub created_at: Option<DateTime<Utc>>,
    /// The raw document fields, kept for field probing.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl CaptureEvent {
    /// Whether this capture is a video clip.
    #[must_use]
    pub fn is_video(&self) -> bool {
        self.media_type == MediaType::Video
    }

    /// The best available preview image: annotated, then debug, then raw.
    #[must_use]
    pub fn display_preview_url(&self) -> Option<&str> {
        first_present(&[
            self.preview_url.as_deref(),
            self.debug_preview_url.as_deref(),
            self.raw_preview_url.as_deref(),
        ])
    }

    /// The best available clip URL. Always `None` for photos.
    #[must_use]
    pub fn display_video_url(&self) -> Option<&str> {
        if !self.is_video() {
            return None;
        }
        first_present(&[
            self.media_url.as_deref(),
            self.debug_video_url.as_deref(),
            self.raw_media_url.as_deref(),
        ])
    }
}

fn first_present<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|url| !url.is_empty())
}

/// The best record for one `(species, category)` pair, merged with its
/// capture for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightEntry {
    /// Which board slot this entry competes for.
    pub category: HighlightCategory,
    /// Category-specific score; higher wins. `None` when the score could
    /// not be computed (such an entry can hold a slot but never take one).
    pub score: Option<f64>,
    /// Species label.
    pub species: String,
    /// Photo or video.
    pub media_type: MediaType,
    /// Annotated preview image.
    pub preview_url: Option<String>,
    /// Preview with debug overlays.
    pub debug_preview_url: Option<String>,
    /// Clip URL (videos only).
    pub video_url: Option<String>,
    /// Clip with debug overlays (videos only).
    pub debug_video_url: Option<String>,
    /// Camera location identifier.
    pub location_id: Option<String>,
    /// Capture time, falling back to the detection time.
    pub created_at: Option<DateTime<Utc>>,
    /// ID of the owning capture; two entries with the same parent show
    /// the same media.
    pub parent_id: String,
    /// Detection confidence, used by the photo display gate.
    pub max_confidence: Option<f64>,
    /// Individual count.
    pub count: Option<u64>,
}

/// A detection/capture pair identified by its canonical key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalSighting {
    /// Identity key; equal keys mean the same physical sighting.
    pub key: String,
    /// Detection document ID.
    pub detection_id: String,
    /// Capture document ID.
    pub capture_id: String,
    /// Resolved species label.
    pub species: String,
    /// Confidence as a percentage in `[0, 100]`.
    pub confidence: Option<f64>,
    /// Capture time, falling back to the detection time.
    pub captured_at: Option<DateTime<Utc>>,
    /// Photo or video.
    pub media_type: MediaType,
    /// Camera location identifier.
    pub location_id: Option<String>,
    /// Best available preview image.
    pub preview_url: Option<String>,
    /// Best available clip URL.
    pub video_url: Option<String>,
    /// Whether the species label was corrected by a reviewer.
    pub corrected: bool,
}
