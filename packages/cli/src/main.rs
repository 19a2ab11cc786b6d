#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the wildlife watch toolchain.
//!
//! Reads highlight boards and deduplicated sightings from a document
//! snapshot, enumerates the pages an access token manages, and runs the
//! earnings report pipeline with a live progress bar.
//!
//! Uses `indicatif-log-bridge` (via
//! [`wildlife_watch_cli_utils::init_logger`]) so that log lines and
//! progress bars never fight for the terminal.

mod commands;

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use wildlife_watch_detection_models::{DEFAULT_HIGHLIGHT_COLLECTION, DEFAULT_SIGHTING_COLLECTION};

/// Wildlife camera highlights, sightings, and earnings reports.
#[derive(Parser)]
#[command(name = "wildlife_watch")]
#[command(about = "Wildlife camera highlights, sightings, and earnings reports")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the per-species highlight board for a window.
    Highlights {
        /// Document snapshot (JSON).
        #[arg(long)]
        snapshot: PathBuf,

        /// Detection collection to read.
        #[arg(long, default_value = DEFAULT_HIGHLIGHT_COLLECTION)]
        collection: String,

        /// Window start (RFC 3339); defaults to the start of today (UTC).
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Window end (RFC 3339, exclusive); defaults to one day after
        /// `--from`.
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },

    /// Print deduplicated sightings grouped by species.
    Sightings {
        /// Document snapshot (JSON).
        #[arg(long)]
        snapshot: PathBuf,

        /// Detection collection to read.
        #[arg(long, default_value = DEFAULT_SIGHTING_COLLECTION)]
        collection: String,
    },

    /// List the pages `WILDLIFE_WATCH_ACCESS_TOKEN` can manage.
    Pages {
        /// Report config (TOML) naming the API host and version.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Fetch per-video earnings and engagement metrics.
    Report {
        /// Content index (CSV: id, `page_id`, `access_token`, `video_length`).
        #[arg(long)]
        rows: PathBuf,

        /// First day of the range (YYYY-MM-DD, UTC).
        #[arg(long)]
        since: NaiveDate,

        /// Last day of the range, inclusive (YYYY-MM-DD, UTC).
        #[arg(long)]
        until: NaiveDate,

        /// Report config (TOML).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write `<stem>_results.csv` and `<stem>_errors.csv`.
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = wildlife_watch_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Highlights {
            snapshot,
            collection,
            from,
            to,
        } => commands::highlights(&multi, &snapshot, &collection, from, to).await?,
        Commands::Sightings {
            snapshot,
            collection,
        } => commands::sightings(&multi, &snapshot, &collection).await?,
        Commands::Pages { config } => commands::pages(&multi, config.as_deref()).await?,
        Commands::Report {
            rows,
            since,
            until,
            config,
            export,
        } => {
            commands::report(
                &multi,
                &commands::ReportArgs {
                    rows,
                    since,
                    until,
                    config,
                    export,
                },
            )
            .await?;
        }
    }

    Ok(())
}
