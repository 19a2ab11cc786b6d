//! HTTP handler functions for the wildlife watch API.

use actix_web::{HttpResponse, web};
use chrono::Utc;
use wildlife_watch_detection::{highlights_for_window, sightings_by_species};
use wildlife_watch_detection_models::TimeRange;
use wildlife_watch_server_models::{
    ApiError, ApiHealth, ApiHighlights, ApiSightingGroup, ApiSightings, ApiSpeciesHighlights,
    CollectionQueryParams, DEFAULT_HIGHLIGHT_COLLECTION, DEFAULT_SIGHTING_COLLECTION,
    HighlightQueryParams, SightingQueryParams,
};

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/highlights`
///
/// Returns the display highlight board for a window (default: the current
/// UTC day).
pub async fn highlights(
    state: web::Data<AppState>,
    params: web::Query<HighlightQueryParams>,
) -> HttpResponse {
    let Some(window) = TimeRange::from_bounds(params.from, params.to, Utc::now()) else {
        return HttpResponse::BadRequest().json(ApiError::new("`to` must be after `from`"));
    };
    let collection = params
        .collection
        .as_deref()
        .unwrap_or(DEFAULT_HIGHLIGHT_COLLECTION);

    match highlights_for_window(state.store.as_ref(), collection, &window).await {
        Ok(board) => HttpResponse::Ok().json(ApiHighlights {
            collection: collection.to_string(),
            from: window.start,
            to: window.end,
            species: board
                .into_iter()
                .map(|s| ApiSpeciesHighlights {
                    species: s.species,
                    entries: s.entries,
                })
                .collect(),
        }),
        Err(e) => {
            log::error!("Failed to load highlights for {collection}: {e}");
            HttpResponse::InternalServerError().json(ApiError::new("Failed to load highlights"))
        }
    }
}

/// `GET /api/sightings`
///
/// Returns deduplicated sightings grouped by species.
pub async fn sightings(
    state: web::Data<AppState>,
    params: web::Query<SightingQueryParams>,
) -> HttpResponse {
    let collection = params
        .collection
        .as_deref()
        .unwrap_or(DEFAULT_SIGHTING_COLLECTION);

    match sightings_by_species(state.store.as_ref(), collection).await {
        Ok(grouped) => {
            let groups: Vec<ApiSightingGroup> = grouped
                .into_iter()
                .map(|(species, sightings)| ApiSightingGroup { species, sightings })
                .collect();
            HttpResponse::Ok().json(ApiSightings {
                collection: collection.to_string(),
                total: groups.iter().map(|g| g.sightings.len()).sum(),
                groups,
            })
        }
        Err(e) => {
            log::error!("Failed to load sightings for {collection}: {e}");
            HttpResponse::InternalServerError().json(ApiError::new("Failed to load sightings"))
        }
    }
}

/// `GET /api/collections`
///
/// Lists the collections in an owner's namespace.
pub async fn collections(
    state: web::Data<AppState>,
    params: web::Query<CollectionQueryParams>,
) -> HttpResponse {
    match state.store.list_collections(&params.owner).await {
        Ok(names) => HttpResponse::Ok().json(names),
        Err(e) => {
            log::error!("Failed to list collections of {}: {e}", params.owner);
            HttpResponse::InternalServerError().json(ApiError::new("Failed to list collections"))
        }
    }
}
