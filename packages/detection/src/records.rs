//! Typed views over raw detection and capture documents.
//!
//! Parsing is lenient: a field holding the wrong type is treated as absent.
//! Only a body that is not a JSON object makes a document unusable.

use serde_json::Value;
use wildlife_watch_detection_models::{CaptureEvent, DetectionRecord, MediaType, TopBox};

use crate::probe::{
    CONFIDENCE_FIELDS, first_f64, get_count, get_f64, get_str, get_timestamp, identity_value,
    resolve_species, value_as_f64,
};
use crate::store::Document;

/// Builds a [`DetectionRecord`] from a raw document.
///
/// Returns `None` when the body is not an object.
#[must_use]
pub fn parse_detection(document: &Document) -> Option<DetectionRecord> {
    let fields = document.data.as_object()?;

    Some(DetectionRecord {
        id: document.id.clone(),
        path: document.path.clone(),
        parent: document.parent.clone(),
        species: resolve_species(fields),
        count: get_count(fields, "count"),
        max_confidence: first_f64(fields, CONFIDENCE_FIELDS),
        max_area: get_f64(fields, "maxArea"),
        top_boxes: fields.get("topBoxes").and_then(parse_top_boxes),
        created_at: get_timestamp(fields, "createdAt"),
        corrected: fields
            .get("corrected")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        fields: fields.clone(),
    })
}

fn parse_top_boxes(value: &Value) -> Option<Vec<TopBox>> {
    let entries = value.as_array()?;
    Some(
        entries
            .iter()
            .map(|entry| TopBox {
                center_dist: entry.get("centerDist").and_then(value_as_f64),
            })
            .collect(),
    )
}

/// Builds a [`CaptureEvent`] from a raw document.
///
/// Returns `None` when the body is not an object.
#[must_use]
pub fn parse_capture(document: &Document) -> Option<CaptureEvent> {
    let fields = document.data.as_object()?;
    let url = |name: &str| get_str(fields, name).map(str::to_string);

    let media_type = ["mediaType", "type"]
        .iter()
        .find_map(|name| get_str(fields, name))
        .and_then(|s| s.parse::<MediaType>().ok())
        .unwrap_or_default();

    Some(CaptureEvent {
        id: document.id.clone(),
        path: document.path.clone(),
        media_type,
        location_id: fields.get("locationId").and_then(identity_value),
        preview_url: url("previewUrl"),
        debug_preview_url: url("debugPreviewUrl"),
        raw_preview_url: url("rawPreviewUrl"),
        media_url: url("mediaUrl"),
        debug_video_url: url("debugVideoUrl"),
        raw_media_url: url("rawMediaUrl"),
        created_at: get_timestamp(fields, "createdAt"),
        fields: fields.clone(),
    })
}
