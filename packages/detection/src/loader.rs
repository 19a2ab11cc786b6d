//! Loads detection/capture pairs from a [`DocumentStore`].
//!
//! Malformed detections and detections whose parent capture cannot be
//! resolved are dropped here and logged at debug level; upstream
//! ingestion produces a steady trickle of both.

use std::collections::{BTreeMap, BTreeSet};

use wildlife_watch_detection_models::{CaptureEvent, DetectionRecord, TimeRange};

use crate::DetectionError;
use crate::records::{parse_capture, parse_detection};
use crate::store::{Document, DocumentStore};

/// Timestamp field used for window queries.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// A detection paired with its owning capture.
pub type DetectionPair = (DetectionRecord, CaptureEvent);

/// Loads the detections of `collection` created inside `window`, paired
/// with their captures.
///
/// # Errors
///
/// Returns [`DetectionError`] if a store query fails.
pub async fn load_detection_pairs(
    store: &dyn DocumentStore,
    collection: &str,
    window: &TimeRange,
) -> Result<Vec<DetectionPair>, DetectionError> {
    let documents = store
        .query_range(collection, CREATED_AT_FIELD, window)
        .await?;
    log::debug!(
        "{collection}: {} detections between {} and {}",
        documents.len(),
        window.start,
        window.end
    );
    resolve_pairs(store, &documents).await
}

/// Loads every detection of `collection` paired with its capture. Used by
/// the deduplicated sightings view, which is not windowed.
///
/// # Errors
///
/// Returns [`DetectionError`] if a store query fails.
pub async fn load_all_pairs(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<DetectionPair>, DetectionError> {
    let documents = store.list_all(collection).await?;
    log::debug!("{collection}: {} detections", documents.len());
    resolve_pairs(store, &documents).await
}

async fn resolve_pairs(
    store: &dyn DocumentStore,
    documents: &[Document],
) -> Result<Vec<DetectionPair>, DetectionError> {
    let detections: Vec<DetectionRecord> = documents
        .iter()
        .filter_map(|doc| {
            let parsed = parse_detection(doc);
            if parsed.is_none() {
                log::debug!("Skipping malformed detection {}", doc.path);
            }
            parsed
        })
        .collect();

    let parent_paths: Vec<String> = detections
        .iter()
        .filter_map(|d| d.parent.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let parents = store.get_many(&parent_paths).await?;
    let captures: BTreeMap<&str, CaptureEvent> = parent_paths
        .iter()
        .zip(parents)
        .filter_map(|(path, doc)| Some((path.as_str(), parse_capture(&doc?)?)))
        .collect();

    let mut pairs = Vec::with_capacity(detections.len());
    let mut orphans = 0usize;

    for detection in detections {
        let capture = detection
            .parent
            .as_deref()
            .and_then(|path| captures.get(path));
        if let Some(capture) = capture {
            let capture = capture.clone();
            pairs.push((detection, capture));
        } else {
            log::debug!("Skipping orphan detection {}", detection.path);
            orphans += 1;
        }
    }

    if orphans > 0 {
        log::debug!("Dropped {orphans} detections without a resolvable capture");
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert(
            "o/captures",
            Document {
                id: "c1".to_string(),
                path: "o/captures/c1".to_string(),
                parent: None,
                data: json!({"mediaType": "image", "createdAt": "2024-05-03T10:00:00Z"}),
            },
        );
        store.insert(
            "o/captures",
            Document {
                id: "c2".to_string(),
                path: "o/captures/c2".to_string(),
                parent: None,
                data: json!("corrupt"),
            },
        );
        let seen = |species: &str, at: &str| json!({"species": species, "createdAt": at});
        for (id, parent, data) in [
            ("d1", Some("o/captures/c1"), seen("Fox", "2024-05-03T10:00:01Z")),
            ("d2", Some("o/captures/gone"), seen("Owl", "2024-05-03T11:00:00Z")),
            ("d3", Some("o/captures/c2"), seen("Elk", "2024-05-03T12:00:00Z")),
            ("d4", Some("o/captures/c1"), json!(17)),
            ("d5", None, seen("Hare", "2024-05-03T13:00:00Z")),
            ("d6", Some("o/captures/c1"), seen("Lynx", "2024-05-02T13:00:00Z")),
        ] {
            store.insert(
                "o/detections",
                Document {
                    id: id.to_string(),
                    path: format!("o/detections/{id}"),
                    parent: parent.map(str::to_string),
                    data,
                },
            );
        }
        store
    }

    #[tokio::test]
    async fn window_load_skips_orphans_and_malformed_documents() {
        let store = store();
        let day = TimeRange::day_of(Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap());
        let pairs = load_detection_pairs(&store, "o/detections", &day)
            .await
            .unwrap();
        let species: Vec<&str> = pairs.iter().map(|(d, _)| d.species.as_str()).collect();
        assert_eq!(species, ["Fox"]);
        assert_eq!(pairs[0].1.id, "c1");
    }

    #[tokio::test]
    async fn full_load_ignores_the_window() {
        let store = store();
        let pairs = load_all_pairs(&store, "o/detections").await.unwrap();
        let species: Vec<&str> = pairs.iter().map(|(d, _)| d.species.as_str()).collect();
        assert_eq!(species, ["Fox", "Lynx"]);
    }
}
