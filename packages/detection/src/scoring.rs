//! Scoring and identity primitives shared by the highlight aggregator and
//! the sighting deduplicator.

use serde_json::{Map, Value};
use wildlife_watch_detection_models::TopBox;

use crate::probe::{IDENTITY_FIELDS, RAW_MEDIA_FIELDS, probe_identity};

/// Minimum confidence (as a fraction) for a photo to appear on the
/// highlight board. Videos are never gated.
pub const PHOTO_CONFIDENCE_GATE: f64 = 0.70;

/// Returns the smallest valid `center_dist` among `boxes`.
///
/// Lower means closer to the frame center. Returns `None` when the list is
/// absent, empty, or has no numeric, non-NaN entry.
#[must_use]
pub fn best_center_distance(boxes: Option<&[TopBox]>) -> Option<f64> {
    boxes?
        .iter()
        .filter_map(|b| b.center_dist)
        .filter(|d| !d.is_nan())
        .reduce(f64::min)
}

/// Converts a raw confidence to a percentage in `[0, 100]`.
///
/// Values up to `1.0` are read as fractions, larger values as percentages
/// already. `NaN` yields `None`.
#[must_use]
pub fn normalize_confidence(raw: f64) -> Option<f64> {
    if raw.is_nan() {
        return None;
    }
    let percent = if raw <= 1.0 { raw * 100.0 } else { raw };
    Some(percent.clamp(0.0, 100.0))
}

/// Converts a raw confidence to a fraction in `[0, 1]`.
#[must_use]
pub fn confidence_fraction(raw: f64) -> Option<f64> {
    if raw.is_nan() {
        return None;
    }
    let fraction = if raw > 1.0 { raw / 100.0 } else { raw };
    Some(fraction.clamp(0.0, 1.0))
}

/// Whether a photo with this confidence clears [`PHOTO_CONFIDENCE_GATE`].
#[must_use]
pub fn passes_photo_gate(max_confidence: Option<f64>) -> bool {
    max_confidence
        .and_then(confidence_fraction)
        .is_some_and(|c| c >= PHOTO_CONFIDENCE_GATE)
}

/// Derives the canonical identity key of a sighting.
///
/// Probes, in order: the explicit identity fields across `sources`, the
/// derived display URLs, then the raw media URL fields across `sources`.
/// The first hit becomes the base; when `timestamp_millis` is known it is
/// appended as `base|millis`. With no hit the base is `record_id`.
///
/// Pure and total.
#[must_use]
pub fn canonical_key(
    record_id: &str,
    sources: &[&Map<String, Value>],
    derived_urls: &[Option<&str>],
    timestamp_millis: Option<i64>,
) -> String {
    let base = probe_identity(sources, IDENTITY_FIELDS)
        .or_else(|| {
            derived_urls
                .iter()
                .flatten()
                .map(|url| url.trim())
                .find(|url| !url.is_empty())
                .map(str::to_string)
        })
        .or_else(|| probe_identity(sources, RAW_MEDIA_FIELDS))
        .unwrap_or_else(|| record_id.to_string());

    match timestamp_millis {
        Some(millis) => format!("{base}|{millis}"),
        None => base,
    }
}
