//! Partitions report rows into per-page request chunks.
//!
//! Every page has its own access token, so a chunk never mixes pages.

use std::collections::{BTreeMap, BTreeSet};

use wildlife_watch_report_models::ReportRow;

/// A batch of IDs fetched in one request pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Owning page.
    pub page_id: String,
    /// Page access token.
    pub access_token: String,
    /// Content IDs, at most the configured chunk size.
    pub ids: Vec<String>,
}

/// Splits `ids` into consecutive slices of at most `size` elements.
#[must_use]
pub fn chunk_ids(ids: &[String], size: usize) -> Vec<Vec<String>> {
    ids.chunks(size.max(1)).map(<[String]>::to_vec).collect()
}

/// Groups `rows` by page, in order of each page's first appearance, and
/// chunks each page's IDs.
///
/// The first non-empty token seen for a page is used for all of its rows.
/// An ID repeated within a page is requested once.
#[must_use]
pub fn partition(rows: &[ReportRow], chunk_size: usize) -> Vec<Chunk> {
    let mut page_order: Vec<&str> = Vec::new();
    let mut pages: BTreeMap<&str, (&str, Vec<String>)> = BTreeMap::new();
    let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();

    for row in rows {
        if !seen.insert((row.page_id.as_str(), row.id.as_str())) {
            log::debug!("Skipping duplicate row {} on page {}", row.id, row.page_id);
            continue;
        }
        let (token, ids) = pages.entry(row.page_id.as_str()).or_insert_with(|| {
            page_order.push(row.page_id.as_str());
            (row.access_token.as_str(), Vec::new())
        });
        if token.is_empty() {
            *token = row.access_token.as_str();
        }
        ids.push(row.id.clone());
    }

    page_order
        .into_iter()
        .filter_map(|page_id| pages.remove(page_id).map(|entry| (page_id, entry)))
        .flat_map(|(page_id, (token, ids))| {
            chunk_ids(&ids, chunk_size)
                .into_iter()
                .map(move |ids| Chunk {
                    page_id: page_id.to_string(),
                    access_token: token.to_string(),
                    ids,
                })
        })
        .collect()
}
