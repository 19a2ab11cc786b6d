//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use wildlife_watch_cli_utils::{IndicatifProgress, MultiProgress};
use wildlife_watch_detection::store::MemoryStore;
use wildlife_watch_detection::{highlights_for_window, sightings_by_species};
use wildlife_watch_detection_models::TimeRange;
use wildlife_watch_report::api::list_pages;
use wildlife_watch_report::config::ReportConfig;
use wildlife_watch_report::export::export_csv;
use wildlife_watch_report::graph::GraphClient;
use wildlife_watch_report::query::day_window;
use wildlife_watch_report::rows::{attach_page_tokens, load_rows};
use wildlife_watch_report::runner::ReportRunner;
use wildlife_watch_report_models::{FetchResult, RunStatus};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// User token for page enumeration.
const ACCESS_TOKEN_VAR: &str = "WILDLIFE_WATCH_ACCESS_TOKEN";

/// Rows printed after a report run; the export has the rest.
const PRINTED_ROWS: usize = 20;

async fn load_store(
    multi: &MultiProgress,
    snapshot: &Path,
) -> Result<MemoryStore, Box<dyn std::error::Error>> {
    let spinner = IndicatifProgress::spinner(multi, &format!("Loading {}", snapshot.display()));
    let store = MemoryStore::load_snapshot(snapshot).await;
    spinner.finish_and_clear();
    Ok(store?)
}

/// `highlights`
pub async fn highlights(
    multi: &MultiProgress,
    snapshot: &Path,
    collection: &str,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> CliResult {
    let window = TimeRange::from_bounds(from, to, Utc::now()).ok_or("--to must be after --from")?;
    let store = load_store(multi, snapshot).await?;
    let board = highlights_for_window(&store, collection, &window).await?;

    println!("Highlights {} .. {}", window.start, window.end);
    if board.is_empty() {
        println!("  (nothing to show)");
    }
    for species in &board {
        println!();
        println!("{}", species.species);
        for entry in &species.entries {
            println!(
                "  {:<22} {:<6} {:<20} {}",
                entry.category.title(),
                entry.media_type.as_ref(),
                entry
                    .created_at
                    .map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string()),
                entry
                    .video_url
                    .as_deref()
                    .or(entry.preview_url.as_deref())
                    .unwrap_or("-"),
            );
        }
    }
    Ok(())
}

/// `sightings`
pub async fn sightings(multi: &MultiProgress, snapshot: &Path, collection: &str) -> CliResult {
    let store = load_store(multi, snapshot).await?;
    let grouped = sightings_by_species(&store, collection).await?;

    for (species, sightings) in &grouped {
        println!("{species} ({})", sightings.len());
        for sighting in sightings {
            println!(
                "  {:>5} {:<20} {:<12} {}",
                sighting
                    .confidence
                    .map_or_else(|| "-".to_string(), |c| format!("{c:.0}%")),
                sighting
                    .captured_at
                    .map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string()),
                sighting.location_id.as_deref().unwrap_or("-"),
                sighting.key,
            );
        }
    }
    let total: usize = grouped.values().map(Vec::len).sum();
    println!();
    println!("{total} sightings across {} species", grouped.len());
    Ok(())
}

/// `pages`
pub async fn pages(multi: &MultiProgress, config: Option<&Path>) -> CliResult {
    let token =
        std::env::var(ACCESS_TOKEN_VAR).map_err(|_| format!("{ACCESS_TOKEN_VAR} is not set"))?;
    let config = ReportConfig::load(config)?;
    let client = GraphClient::new(&config)?;

    let spinner = IndicatifProgress::spinner(multi, "Listing pages");
    let pages = list_pages(&client, &token, &CancellationToken::new()).await;
    spinner.finish_and_clear();
    let pages = pages?;

    println!("{:<20} NAME", "ID");
    println!("{}", "-".repeat(50));
    for page in &pages {
        println!("{:<20} {}", page.id, page.name);
    }
    Ok(())
}

/// Arguments of `report`.
pub struct ReportArgs {
    pub rows: PathBuf,
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub config: Option<PathBuf>,
    pub export: Option<PathBuf>,
}

/// `report`
pub async fn report(multi: &MultiProgress, args: &ReportArgs) -> CliResult {
    let (since, until) =
        day_window(args.since, args.until).ok_or("--until must not precede --since")?;
    let config = ReportConfig::load(args.config.as_deref())?;
    let client = Arc::new(GraphClient::new(&config)?);

    let mut rows = load_rows(&args.rows)?;
    if rows.iter().any(|row| row.access_token.is_empty()) {
        match std::env::var(ACCESS_TOKEN_VAR) {
            Ok(token) => {
                let pages = list_pages(client.as_ref(), &token, &CancellationToken::new()).await?;
                attach_page_tokens(&mut rows, &pages);
            }
            Err(_) => {
                log::warn!("Some rows have no access token and {ACCESS_TOKEN_VAR} is not set");
            }
        }
    }

    let bar = IndicatifProgress::chunks_bar(multi, "Checking metric permissions…");
    let runner = ReportRunner::new(client, config, bar);

    let run = runner.run(&rows, since, until);
    tokio::pin!(run);
    let outcome = tokio::select! {
        outcome = &mut run => outcome,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted, cancelling the run");
            runner.cancel();
            run.await
        }
    };

    println!("{}", outcome.progress.status_text);
    if let RunStatus::Failed(message) = &outcome.status {
        return Err(message.clone().into());
    }

    if !outcome.missing_metrics.is_empty() {
        let names: Vec<String> = outcome.missing_metrics.iter().map(ToString::to_string).collect();
        println!("Permission needed for: {}", names.join(", "));
    }

    print_results(outcome.live_view());

    let totals = outcome.totals();
    println!();
    println!("{:<20} {:>14}", "TOTAL", "");
    println!("{:<20} {:>14.2}", "earnings", totals.earnings);
    println!("{:<20} {:>14.2}", "earnings (lifetime)", totals.earnings_lifetime);
    println!("{:<20} {:>14.0}", "views", totals.views);
    println!("{:<20} {:>14.0}", "reach", totals.reach);
    println!("{:<20} {:>14.0}", "likes", totals.likes);
    println!("{:<20} {:>14.0}", "comments", totals.comments);
    println!("{:<20} {:>14}", "succeeded", totals.succeeded);
    println!("{:<20} {:>14}", "failed", totals.failed);

    if let Some(stem) = &args.export {
        let paths = export_csv(&outcome.results, stem)?;
        println!();
        println!("Wrote {}", paths.results.display());
        println!("Wrote {}", paths.errors.display());
    }

    Ok(())
}

fn print_results(results: &[FetchResult]) {
    if results.is_empty() {
        return;
    }
    println!();
    println!(
        "{:<20} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "ID", "EARNINGS", "LIFETIME", "VIEWS", "REACH", "LIKES", "COMMENTS"
    );
    for result in results.iter().take(PRINTED_ROWS) {
        match result {
            FetchResult::Success { id, metrics, .. } => {
                let cells: Vec<String> =
                    metrics.columns().iter().map(|(_, v)| v.to_cell()).collect();
                println!(
                    "{id:<20} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
                    cells[0], cells[1], cells[2], cells[3], cells[4], cells[5]
                );
            }
            FetchResult::Error { id, error, .. } => println!("{id:<20} error: {error}"),
        }
    }
    if results.len() > PRINTED_ROWS {
        println!("… {} more", results.len() - PRINTED_ROWS);
    }
}
