//! CSV export of a run: one file of successful rows, one of errors.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use wildlife_watch_report_models::FetchResult;

use crate::ReportError;

/// Header of the results file.
pub const RESULTS_HEADER: &[&str] = &[
    "id",
    "page_id",
    "video_length",
    "earnings",
    "earnings_lifetime",
    "views",
    "reach",
    "likes",
    "comments",
];

/// Header of the errors file.
pub const ERRORS_HEADER: &[&str] = &["id", "page_id", "error"];

/// Files written by [`export_csv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    /// `<stem>_results.csv`
    pub results: PathBuf,
    /// `<stem>_errors.csv`
    pub errors: PathBuf,
}

impl ExportPaths {
    /// The two file paths for `stem`.
    #[must_use]
    pub fn for_stem(stem: &Path) -> Self {
        let with_suffix = |suffix: &str| {
            let mut name = stem.as_os_str().to_owned();
            name.push(suffix);
            PathBuf::from(name)
        };
        Self {
            results: with_suffix("_results.csv"),
            errors: with_suffix("_errors.csv"),
        }
    }
}

/// Successful results sorted by range earnings, highest first. Rows
/// without a numeric value sort last, keeping their relative order.
#[must_use]
pub fn sorted_successes(results: &[FetchResult]) -> Vec<&FetchResult> {
    let mut successes: Vec<&FetchResult> = results.iter().filter(|r| !r.is_error()).collect();
    successes.sort_by(|a, b| {
        let earnings = |r: &FetchResult| r.metrics().and_then(|m| m.earnings.as_f64());
        match (earnings(a), earnings(b)) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
    successes
}

/// Writes `results` to `<stem>_results.csv` and `<stem>_errors.csv`.
///
/// # Errors
///
/// Returns [`ReportError`] if either file cannot be written.
pub fn export_csv(results: &[FetchResult], stem: &Path) -> Result<ExportPaths, ReportError> {
    let paths = ExportPaths::for_stem(stem);

    let mut writer = csv::Writer::from_path(&paths.results)?;
    writer.write_record(RESULTS_HEADER)?;
    let successes = sorted_successes(results);
    for result in &successes {
        if let FetchResult::Success {
            id,
            page_id,
            video_length,
            metrics,
        } = result
        {
            let mut record = vec![
                id.clone(),
                page_id.clone(),
                video_length.map(|v| v.to_string()).unwrap_or_default(),
            ];
            record.extend(metrics.columns().iter().map(|(_, value)| value.to_cell()));
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;

    let mut writer = csv::Writer::from_path(&paths.errors)?;
    writer.write_record(ERRORS_HEADER)?;
    let mut error_count = 0usize;
    for result in results {
        if let FetchResult::Error { id, page_id, error } = result {
            writer.write_record([id.as_str(), page_id.as_str(), error.as_str()])?;
            error_count += 1;
        }
    }
    writer.flush()?;

    log::info!(
        "Exported {} results to {} and {error_count} errors to {}",
        successes.len(),
        paths.results.display(),
        paths.errors.display()
    );

    Ok(paths)
}
