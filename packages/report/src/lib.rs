#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Earnings report pipeline.
//!
//! Fetches per-video metrics from the remote insights API for a set of
//! [`ReportRow`](wildlife_watch_report_models::ReportRow)s. Rows are
//! grouped by page, chunked, and fetched by a bounded pool of workers with
//! exponential-backoff retry and bisection-based fault isolation. A
//! [`runner::ReportRunner`] owns the active run and its cancellation token.

pub mod api;
pub mod chunking;
pub mod config;
pub mod export;
pub mod graph;
pub mod isolate;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod retry;
pub mod rows;
pub mod runner;
pub mod shaping;
pub mod totals;

/// Errors that can occur outside the per-row fetch path.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// I/O error (config, row, or export file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed.
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV read or write failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP client construction failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote API call outside a run failed.
    #[error("API error: {0}")]
    Api(#[from] api::ApiError),

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}
