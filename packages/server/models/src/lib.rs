#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the wildlife watch read API.
//!
//! These types are serialized to JSON for the REST API. They wrap the
//! detection view models with the request context (collection, window)
//! so clients can tell which slice of data they are looking at.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wildlife_watch_detection_models::{CanonicalSighting, HighlightEntry};

pub use wildlife_watch_detection_models::{
    DEFAULT_HIGHLIGHT_COLLECTION, DEFAULT_SIGHTING_COLLECTION,
};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// What went wrong.
    pub error: String,
}

impl ApiError {
    /// Wraps a message.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Query parameters for the highlights endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightQueryParams {
    /// Collection to read; defaults to [`DEFAULT_HIGHLIGHT_COLLECTION`].
    pub collection: Option<String>,
    /// Window start (RFC 3339). Defaults to the start of the current UTC
    /// day.
    pub from: Option<DateTime<Utc>>,
    /// Window end (RFC 3339, exclusive). Defaults to one day after
    /// `from`.
    pub to: Option<DateTime<Utc>>,
}

/// Query parameters for the sightings endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SightingQueryParams {
    /// Collection to read; defaults to [`DEFAULT_SIGHTING_COLLECTION`].
    pub collection: Option<String>,
}

/// Query parameters for the collections endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionQueryParams {
    /// Namespace owner.
    pub owner: String,
}

/// The highlight board of one species.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpeciesHighlights {
    /// Species label.
    pub species: String,
    /// Entries in category priority order.
    pub entries: Vec<HighlightEntry>,
}

/// Response of the highlights endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHighlights {
    /// Collection that was read.
    pub collection: String,
    /// Window start.
    pub from: DateTime<Utc>,
    /// Window end (exclusive).
    pub to: DateTime<Utc>,
    /// Species with at least one displayable entry.
    pub species: Vec<ApiSpeciesHighlights>,
}

/// Deduplicated sightings of one species.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSightingGroup {
    /// Species label.
    pub species: String,
    /// Sightings, most confident first.
    pub sightings: Vec<CanonicalSighting>,
}

/// Response of the sightings endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSightings {
    /// Collection that was read.
    pub collection: String,
    /// Sightings across all groups.
    pub total: usize,
    /// Groups in species name order.
    pub groups: Vec<ApiSightingGroup>,
}
