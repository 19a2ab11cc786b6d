//! "Highlights of the day" aggregation.
//!
//! Every detection can compete in up to four [`HighlightCategory`] slots
//! for its species. Each slot keeps only its best-scoring entry. The
//! board is then flattened for display: one capture is shown at most once
//! per species, and low-confidence photos are hidden.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use wildlife_watch_detection_models::{
    CaptureEvent, DetectionRecord, HighlightCategory, HighlightEntry, MediaType,
};

use crate::scoring::{best_center_distance, passes_photo_gate};

/// Count multiplier in the video score. Counts at or above this value
/// stop acting as a pure tie-break over recency.
pub const VIDEO_COUNT_WEIGHT: f64 = 100_000.0;

/// Best entry per category for one species.
pub type SpeciesSlots = BTreeMap<HighlightCategory, HighlightEntry>;

/// Best entry per `(species, category)`. A missing category key means no
/// candidate qualified.
pub type HighlightBoard = BTreeMap<String, SpeciesSlots>;

/// The display-ready highlights for one species.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesHighlights {
    /// Species label.
    pub species: String,
    /// Entries in category priority order.
    pub entries: Vec<HighlightEntry>,
}

/// Builds the highlight board from detection/capture pairs.
///
/// The caller is expected to have already restricted `pairs` to the time
/// window of interest.
pub fn aggregate_highlights<'a, I>(pairs: I) -> HighlightBoard
where
    I: IntoIterator<Item = (&'a DetectionRecord, &'a CaptureEvent)>,
{
    let mut board = HighlightBoard::new();

    for (detection, capture) in pairs {
        let slots = board.entry(detection.species.clone()).or_default();
        for candidate in category_candidates(detection, capture) {
            merge_candidate(slots, candidate);
        }
    }

    board
}

/// Computes every category entry `detection` qualifies for.
#[must_use]
pub fn category_candidates(
    detection: &DetectionRecord,
    capture: &CaptureEvent,
) -> Vec<HighlightEntry> {
    let mut candidates = Vec::with_capacity(HighlightCategory::ALL.len());

    if let Some(area) = detection.max_area {
        candidates.push(entry(
            detection,
            capture,
            HighlightCategory::BiggestBoundingBox,
            Some(area),
        ));
    }

    if let Some(count) = detection.count {
        #[allow(clippy::cast_precision_loss)]
        let score = count as f64;
        candidates.push(entry(detection, capture, HighlightCategory::MostAnimals, Some(score)));
    }

    if let Some(distance) = best_center_distance(detection.top_boxes.as_deref()) {
        candidates.push(entry(
            detection,
            capture,
            HighlightCategory::MostCentered,
            Some(-distance),
        ));
    }

    if capture.is_video() {
        candidates.push(entry(
            detection,
            capture,
            HighlightCategory::Video,
            video_score(detection, capture),
        ));
    }

    candidates
}

/// Video ranking: count dominates, capture time breaks ties.
///
/// `count * 100_000 + epoch_millis`, or whichever term is available.
#[must_use]
pub fn video_score(detection: &DetectionRecord, capture: &CaptureEvent) -> Option<f64> {
    #[allow(clippy::cast_precision_loss)]
    let millis = capture
        .created_at
        .or(detection.created_at)
        .map(|at| at.timestamp_millis() as f64);
    #[allow(clippy::cast_precision_loss)]
    let weighted_count = detection.count.map(|c| c as f64 * VIDEO_COUNT_WEIGHT);

    match (weighted_count, millis) {
        (Some(c), Some(t)) => Some(c + t),
        (c, t) => c.or(t),
    }
}

/// Offers `candidate` for its category slot.
///
/// The holder is replaced only when both scores are defined and the
/// candidate's is strictly greater. Returns whether the slot changed.
pub fn merge_candidate(slots: &mut SpeciesSlots, candidate: HighlightEntry) -> bool {
    match slots.get(&candidate.category) {
        None => {
            slots.insert(candidate.category, candidate);
            true
        }
        Some(holder) => match (holder.score, candidate.score) {
            (Some(current), Some(offered)) if offered > current => {
                slots.insert(candidate.category, candidate);
                true
            }
            _ => false,
        },
    }
}

/// Flattens the board for display.
///
/// Per species, categories are visited in priority order and an entry is
/// skipped if an earlier category already shows the same capture. Photos
/// then have to clear the confidence gate; videos always pass. Species
/// left with nothing to show are omitted.
#[must_use]
pub fn display_highlights(board: &HighlightBoard) -> Vec<SpeciesHighlights> {
    board
        .iter()
        .filter_map(|(species, slots)| {
            let mut shown_parents = BTreeSet::new();
            let entries: Vec<HighlightEntry> = HighlightCategory::ALL
                .iter()
                .filter_map(|category| slots.get(category))
                .filter(|entry| shown_parents.insert(entry.parent_id.clone()))
                .filter(|entry| passes_display_gate(entry))
                .cloned()
                .collect();

            (!entries.is_empty()).then(|| SpeciesHighlights {
                species: species.clone(),
                entries,
            })
        })
        .collect()
}

/// Videos always show; photos need enough detector confidence.
#[must_use]
pub fn passes_display_gate(entry: &HighlightEntry) -> bool {
    entry.category == HighlightCategory::Video
        || entry.media_type == MediaType::Video
        || passes_photo_gate(entry.max_confidence)
}

fn entry(
    detection: &DetectionRecord,
    capture: &CaptureEvent,
    category: HighlightCategory,
    score: Option<f64>,
) -> HighlightEntry {
    HighlightEntry {
        category,
        score,
        species: detection.species.clone(),
        media_type: capture.media_type,
        preview_url: capture.preview_url.clone(),
        debug_preview_url: capture.debug_preview_url.clone(),
        video_url: capture.display_video_url().map(str::to_string),
        debug_video_url: capture
            .is_video()
            .then(|| capture.debug_video_url.clone())
            .flatten(),
        location_id: capture.location_id.clone(),
        created_at: capture.created_at.or(detection.created_at),
        parent_id: capture.id.clone(),
        max_confidence: detection.max_confidence,
        count: detection.count,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone as _, Utc};
    use wildlife_watch_detection_models::TopBox;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 3, hour, 0, 0).unwrap()
    }

    fn capture(id: &str, media_type: MediaType, hour: u32) -> CaptureEvent {
        CaptureEvent {
            id: id.to_string(),
            path: format!("captures/{id}"),
            media_type,
            location_id: Some("cam-1".to_string()),
            preview_url: Some(format!("https://cdn/{id}.jpg")),
            debug_preview_url: None,
            raw_preview_url: None,
            media_url: Some(format!("https://cdn/{id}.mp4")),
            debug_video_url: None,
            raw_media_url: None,
            created_at: Some(at(hour)),
            fields: serde_json::Map::new(),
        }
    }

    fn detection(species: &str, parent: &CaptureEvent) -> DetectionRecord {
        DetectionRecord {
            id: format!("{}-{species}", parent.id),
            path: format!("{}/detections/{species}", parent.path),
            parent: Some(parent.path.clone()),
            species: species.to_string(),
            count: None,
            max_confidence: Some(0.9),
            max_area: None,
            top_boxes: None,
            created_at: parent.created_at,
            corrected: false,
            fields: serde_json::Map::new(),
        }
    }

    fn animals(count: u64, parent: &CaptureEvent) -> HighlightEntry {
        let mut d = detection("Deer", parent);
        d.count = Some(count);
        category_candidates(&d, parent)
            .into_iter()
            .find(|e| e.category == HighlightCategory::MostAnimals)
            .unwrap()
    }

    #[test]
    fn strictly_higher_score_replaces_holder() {
        let c1 = capture("c1", MediaType::Image, 8);
        let c2 = capture("c2", MediaType::Image, 9);
        let mut slots = SpeciesSlots::new();
        assert!(merge_candidate(&mut slots, animals(3, &c1)));
        assert!(merge_candidate(&mut slots, animals(5, &c2)));
        assert_eq!(slots[&HighlightCategory::MostAnimals].parent_id, "c2");
    }

    #[test]
    fn equal_or_lower_score_keeps_holder() {
        let c1 = capture("c1", MediaType::Image, 8);
        let c2 = capture("c2", MediaType::Image, 9);
        let mut slots = SpeciesSlots::new();
        merge_candidate(&mut slots, animals(3, &c1));
        assert!(!merge_candidate(&mut slots, animals(3, &c2)));
        assert!(!merge_candidate(&mut slots, animals(1, &c2)));
        assert_eq!(slots[&HighlightCategory::MostAnimals].parent_id, "c1");
    }

    #[test]
    fn undefined_scores_never_replace() {
        let c1 = capture("c1", MediaType::Video, 8);
        let c2 = capture("c2", MediaType::Video, 9);
        let mut holder = animals(3, &c1);
        holder.score = None;
        let mut slots = SpeciesSlots::new();
        merge_candidate(&mut slots, holder);
        assert!(!merge_candidate(&mut slots, animals(50, &c2)));

        let mut slots = SpeciesSlots::new();
        merge_candidate(&mut slots, animals(3, &c1));
        let mut unscored = animals(50, &c2);
        unscored.score = None;
        assert!(!merge_candidate(&mut slots, unscored));
    }

    #[test]
    fn candidates_follow_available_fields() {
        let photo = capture("c1", MediaType::Image, 8);
        let mut d = detection("Fox", &photo);
        d.max_area = Some(0.25);
        d.top_boxes = Some(vec![
            TopBox {
                center_dist: Some(0.3),
            },
            TopBox {
                center_dist: Some(0.1),
            },
        ]);
        let categories: Vec<HighlightCategory> = category_candidates(&d, &photo)
            .iter()
            .map(|e| e.category)
            .collect();
        assert_eq!(
            categories,
            [HighlightCategory::BiggestBoundingBox, HighlightCategory::MostCentered]
        );
        let centered = &category_candidates(&d, &photo)[1];
        assert_eq!(centered.score, Some(-0.1));
    }

    #[test]
    fn video_score_prefers_count_then_recency() {
        let early = capture("c1", MediaType::Video, 6);
        let late = capture("c2", MediaType::Video, 20);
        let mut two_early = detection("Bear", &early);
        two_early.count = Some(2);
        let mut one_late = detection("Bear", &late);
        one_late.count = Some(1);
        assert!(video_score(&two_early, &early) > video_score(&one_late, &late));

        let mut one_early = detection("Bear", &early);
        one_early.count = Some(1);
        assert!(video_score(&one_late, &late) > video_score(&one_early, &early));

        let no_count = detection("Bear", &late);
        #[allow(clippy::cast_precision_loss)]
        let expected = at(20).timestamp_millis() as f64;
        assert_eq!(video_score(&no_count, &late), Some(expected));
    }

    #[test]
    fn aggregates_per_species_and_category() {
        let c1 = capture("c1", MediaType::Image, 8);
        let c2 = capture("c2", MediaType::Video, 9);
        let mut fox1 = detection("Fox", &c1);
        fox1.count = Some(1);
        fox1.max_area = Some(0.4);
        let mut fox2 = detection("Fox", &c2);
        fox2.count = Some(4);
        fox2.max_area = Some(0.1);
        let mut owl = detection("Owl", &c1);
        owl.count = Some(2);

        let pairs = [(&fox1, &c1), (&fox2, &c2), (&owl, &c1)];
        let board = aggregate_highlights(pairs);

        let fox = &board["Fox"];
        assert_eq!(fox[&HighlightCategory::BiggestBoundingBox].parent_id, "c1");
        assert_eq!(fox[&HighlightCategory::MostAnimals].parent_id, "c2");
        assert_eq!(fox[&HighlightCategory::Video].parent_id, "c2");
        assert!(!fox.contains_key(&HighlightCategory::MostCentered));
        assert_eq!(board["Owl"].len(), 1);
    }

    #[test]
    fn display_collapses_shared_captures_in_priority_order() {
        let clip = capture("c2", MediaType::Video, 9);
        let mut bear = detection("Bear", &clip);
        bear.count = Some(3);
        bear.max_area = Some(0.5);
        let board = aggregate_highlights([(&bear, &clip)]);

        let shown = display_highlights(&board);
        assert_eq!(shown.len(), 1);
        let categories: Vec<HighlightCategory> =
            shown[0].entries.iter().map(|e| e.category).collect();
        assert_eq!(categories, [HighlightCategory::BiggestBoundingBox]);
    }

    #[test]
    fn photo_gate_applies_to_images_only() {
        let photo_low = capture("c1", MediaType::Image, 8);
        let photo_ok = capture("c2", MediaType::Image, 9);
        let clip = capture("c3", MediaType::Video, 10);

        let mut low = detection("Lynx", &photo_low);
        low.max_area = Some(0.9);
        low.max_confidence = Some(0.69);
        let mut ok = detection("Lynx", &photo_ok);
        ok.count = Some(1);
        ok.max_confidence = Some(0.70);
        let mut video = detection("Lynx", &clip);
        video.max_confidence = None;

        let board = aggregate_highlights([(&low, &photo_low), (&ok, &photo_ok), (&video, &clip)]);
        let shown = display_highlights(&board);
        let parents: Vec<&str> = shown[0].entries.iter().map(|e| e.parent_id.as_str()).collect();
        assert_eq!(parents, ["c2", "c3"]);
    }

    #[test]
    fn species_with_nothing_to_show_are_omitted() {
        let photo = capture("c1", MediaType::Image, 8);
        let mut dim = detection("Mole", &photo);
        dim.count = Some(1);
        dim.max_confidence = Some(0.2);
        let board = aggregate_highlights([(&dim, &photo)]);
        assert!(display_highlights(&board).is_empty());
    }
}
