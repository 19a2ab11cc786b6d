//! Collapses detections that describe the same physical sighting.
//!
//! The ingestion pipeline can write the same clip or photo more than once
//! (re-processing, retries, species corrections). Each detection/capture
//! pair is reduced to a [`CanonicalSighting`] keyed by [`canonical_key`]
//! and only the best one per key survives.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use wildlife_watch_detection_models::{CanonicalSighting, CaptureEvent, DetectionRecord};

use crate::scoring::{canonical_key, normalize_confidence};

/// Confidence used for comparison when a sighting has none.
const MISSING_CONFIDENCE: f64 = -1.0;

/// Builds the canonical view of one detection/capture pair.
#[must_use]
pub fn to_canonical(detection: &DetectionRecord, capture: &CaptureEvent) -> CanonicalSighting {
    let captured_at = capture.created_at.or(detection.created_at);
    let video_url = capture.display_video_url();
    let preview_url = capture.display_preview_url();

    let key = canonical_key(
        &detection.id,
        &[&detection.fields, &capture.fields],
        &[video_url, preview_url],
        captured_at.map(|at| at.timestamp_millis()),
    );

    CanonicalSighting {
        key,
        detection_id: detection.id.clone(),
        capture_id: capture.id.clone(),
        species: detection.species.clone(),
        confidence: detection.max_confidence.and_then(normalize_confidence),
        captured_at,
        media_type: capture.media_type,
        location_id: capture.location_id.clone(),
        preview_url: preview_url.map(str::to_string),
        video_url: video_url.map(str::to_string),
        corrected: detection.corrected,
    }
}

/// Picks the better of two sightings sharing a key.
///
/// Higher confidence wins, then the later capture time. On a full tie the
/// `existing` sighting is kept.
#[must_use]
pub fn pick_better_highlight(
    existing: CanonicalSighting,
    candidate: CanonicalSighting,
) -> CanonicalSighting {
    let confidence = |s: &CanonicalSighting| s.confidence.unwrap_or(MISSING_CONFIDENCE);

    let ordering = confidence(&candidate)
        .partial_cmp(&confidence(&existing))
        .unwrap_or(Ordering::Equal)
        .then_with(|| candidate.captured_at.cmp(&existing.captured_at));

    if ordering == Ordering::Greater {
        candidate
    } else {
        existing
    }
}

/// Deduplicates pairs by canonical key.
///
/// The output holds one sighting per key, in the order each key was first
/// seen.
pub fn deduplicate<'a, I>(pairs: I) -> Vec<CanonicalSighting>
where
    I: IntoIterator<Item = (&'a DetectionRecord, &'a CaptureEvent)>,
{
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, CanonicalSighting> = HashMap::new();

    for (detection, capture) in pairs {
        let sighting = to_canonical(detection, capture);
        match best.remove(&sighting.key) {
            Some(existing) => {
                log::trace!("Duplicate sighting {}", sighting.key);
                let winner = pick_better_highlight(existing, sighting);
                best.insert(winner.key.clone(), winner);
            }
            None => {
                order.push(sighting.key.clone());
                best.insert(sighting.key.clone(), sighting);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| best.remove(&key))
        .collect()
}

/// Groups sightings by species, newest first within each group. Sightings
/// without a capture time sort last.
#[must_use]
pub fn group_by_species(
    sightings: Vec<CanonicalSighting>,
) -> BTreeMap<String, Vec<CanonicalSighting>> {
    let mut groups: BTreeMap<String, Vec<CanonicalSighting>> = BTreeMap::new();
    for sighting in sightings {
        groups
            .entry(sighting.species.clone())
            .or_default()
            .push(sighting);
    }
    for list in groups.values_mut() {
        list.sort_by(|a, b| match (a.captured_at, b.captured_at) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }
    groups
}
