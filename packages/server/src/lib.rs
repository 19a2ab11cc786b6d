#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web read API for wildlife camera data.
//!
//! Serves the per-species highlight board and the deduplicated sighting
//! view as JSON. Documents come from a [`MemoryStore`] loaded from a
//! snapshot export of the document database at startup.

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use wildlife_watch_detection::DetectionError;
use wildlife_watch_detection::store::{DocumentStore, MemoryStore};

/// Snapshot read when `WILDLIFE_WATCH_SNAPSHOT` is unset.
pub const DEFAULT_SNAPSHOT_PATH: &str = "data/snapshot.json";

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Bind or runtime failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot could not be loaded.
    #[error("Detection store error: {0}")]
    Detection(#[from] DetectionError),
}

/// Shared application state.
pub struct AppState {
    /// Document store backing every endpoint.
    pub store: Arc<dyn DocumentStore>,
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/highlights", web::get().to(handlers::highlights))
            .route("/sightings", web::get().to(handlers::sightings))
            .route("/collections", web::get().to(handlers::collections)),
    );
}

/// Starts the read API server.
///
/// Loads the snapshot named by `WILDLIFE_WATCH_SNAPSHOT` (default
/// [`DEFAULT_SNAPSHOT_PATH`]) and serves it on `BIND_ADDR:PORT` (default
/// `127.0.0.1:8080`). The caller provides the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns [`ServerError`] if the snapshot cannot be loaded or the HTTP
/// server fails to bind.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> Result<(), ServerError> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let snapshot_path = std::env::var("WILDLIFE_WATCH_SNAPSHOT")
        .map_or_else(|_| PathBuf::from(DEFAULT_SNAPSHOT_PATH), PathBuf::from);
    let store = MemoryStore::load_snapshot(&snapshot_path).await?;

    let state = web::Data::new(AppState {
        store: Arc::new(store),
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await?;

    Ok(())
}
