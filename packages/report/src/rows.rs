//! Loading report rows from the local content index (CSV).
//!
//! Expected header: `id,page_id,access_token,video_length`. The token and
//! length columns may be empty or absent; rows without a token can be
//! completed from the page list with [`attach_page_tokens`].

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use wildlife_watch_report_models::{PageAccount, ReportRow};

use crate::ReportError;

/// Reads rows from CSV text.
///
/// # Errors
///
/// Returns [`ReportError::Csv`] if a record is malformed.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<ReportRow>, ReportError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in reader.deserialize::<ReportRow>() {
        let row = record?;
        if row.id.is_empty() || row.page_id.is_empty() {
            log::debug!("Skipping row without id or page_id: {row:?}");
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Reads rows from a CSV file.
///
/// # Errors
///
/// Returns [`ReportError`] if the file cannot be opened or parsed.
pub fn load_rows(path: &Path) -> Result<Vec<ReportRow>, ReportError> {
    let file = std::fs::File::open(path)?;
    let rows = read_rows(file)?;
    log::info!("Loaded {} report rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Fills empty row tokens from `pages`. Returns how many rows still lack
/// a token.
pub fn attach_page_tokens(rows: &mut [ReportRow], pages: &[PageAccount]) -> usize {
    let tokens: BTreeMap<&str, &str> = pages
        .iter()
        .map(|p| (p.id.as_str(), p.access_token.as_str()))
        .collect();

    let mut unresolved = 0;
    for row in rows.iter_mut().filter(|r| r.access_token.is_empty()) {
        match tokens.get(row.page_id.as_str()) {
            Some(token) if !token.is_empty() => row.access_token = (*token).to_string(),
            _ => unresolved += 1,
        }
    }
    if unresolved > 0 {
        log::warn!("{unresolved} rows have no access token for their page");
    }
    unresolved
}
