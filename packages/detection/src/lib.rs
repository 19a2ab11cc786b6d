#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Camera-trap detection processing.
//!
//! Reads detection and capture documents through a [`store::DocumentStore`]
//! and derives two read-only views from them: the per-species
//! [`highlights`] board and the deduplicated [`dedup`] sighting list.

pub mod dedup;
pub mod highlights;
pub mod loader;
pub mod probe;
pub mod records;
pub mod scoring;
pub mod store;

use std::collections::BTreeMap;

use wildlife_watch_detection_models::{CanonicalSighting, TimeRange};

use crate::highlights::SpeciesHighlights;
use crate::store::DocumentStore;

/// Errors that can occur while reading detection data.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// I/O error (snapshot read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document store rejected a query.
    #[error("Document store error: {message}")]
    Store {
        /// Description of what went wrong.
        message: String,
    },
}

/// Loads `collection` for `window` and returns the display-ready highlight
/// board.
///
/// # Errors
///
/// Returns [`DetectionError`] if a store query fails.
pub async fn highlights_for_window(
    store: &dyn DocumentStore,
    collection: &str,
    window: &TimeRange,
) -> Result<Vec<SpeciesHighlights>, DetectionError> {
    let pairs = loader::load_detection_pairs(store, collection, window).await?;
    let board = highlights::aggregate_highlights(pairs.iter().map(|(d, c)| (d, c)));
    log::info!(
        "{collection}: {} pairs, {} species on the board",
        pairs.len(),
        board.len()
    );
    Ok(highlights::display_highlights(&board))
}

/// Loads every detection of `collection` and returns the deduplicated
/// sightings grouped by species.
///
/// # Errors
///
/// Returns [`DetectionError`] if a store query fails.
pub async fn sightings_by_species(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<BTreeMap<String, Vec<CanonicalSighting>>, DetectionError> {
    let pairs = loader::load_all_pairs(store, collection).await?;
    let sightings = dedup::deduplicate(pairs.iter().map(|(d, c)| (d, c)));
    log::info!(
        "{collection}: {} pairs collapsed to {} sightings",
        pairs.len(),
        sightings.len()
    );
    Ok(dedup::group_by_species(sightings))
}
