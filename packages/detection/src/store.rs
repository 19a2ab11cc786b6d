//! Document-store read contract and an in-memory implementation.
//!
//! The production backend is a managed document database; this crate only
//! depends on the [`DocumentStore`] trait. [`MemoryStore`] backs tests, the
//! CLI, and the read API (loaded from a JSON snapshot export).

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use wildlife_watch_detection_models::TimeRange;

use crate::DetectionError;
use crate::probe::parse_timestamp;

/// A raw document as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document ID (last path segment).
    pub id: String,
    /// Full document path.
    pub path: String,
    /// Path of the parent document, if this document hangs off one.
    #[serde(default)]
    pub parent: Option<String>,
    /// Document body. Anything but a JSON object is malformed.
    pub data: serde_json::Value,
}

/// Read operations the detection pipelines need from the document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns documents of `collection` whose `field` timestamp falls in
    /// `range`, ordered by that timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] if the backend query fails.
    async fn query_range(
        &self,
        collection: &str,
        field: &str,
        range: &TimeRange,
    ) -> Result<Vec<Document>, DetectionError>;

    /// Returns every document of `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] if the backend query fails.
    async fn list_all(&self, collection: &str) -> Result<Vec<Document>, DetectionError>;

    /// Resolves documents by path. The output is index-aligned with
    /// `paths`; unknown paths yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] if the backend lookup fails.
    async fn get_many(&self, paths: &[String]) -> Result<Vec<Option<Document>>, DetectionError>;

    /// Lists the collection names in `owner`'s namespace.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] if the backend listing fails.
    async fn list_collections(&self, owner: &str) -> Result<Vec<String>, DetectionError>;
}

/// On-disk snapshot format: collection name to documents.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Documents grouped by collection name.
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<Document>>,
}

/// An in-process [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: BTreeMap<String, Vec<Document>>,
    by_path: BTreeMap<String, Document>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document to `collection`.
    pub fn insert(&mut self, collection: &str, document: Document) {
        self.by_path
            .insert(document.path.clone(), document.clone());
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Builds a store from an in-memory snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut store = Self::new();
        for (collection, documents) in snapshot.collections {
            for document in documents {
                store.insert(&collection, document);
            }
        }
        store
    }

    /// Parses a JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::Json`] if the text is not a valid snapshot.
    pub fn from_snapshot_str(json: &str) -> Result<Self, DetectionError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Loads a JSON snapshot file.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] if the file cannot be read or parsed.
    pub async fn load_snapshot(path: &Path) -> Result<Self, DetectionError> {
        log::info!("Loading document snapshot from {}", path.display());
        let json = tokio::fs::read_to_string(path).await?;
        let store = Self::from_snapshot_str(&json)?;
        log::info!(
            "Loaded {} documents across {} collections",
            store.by_path.len(),
            store.collections.len()
        );
        Ok(store)
    }

    fn collection(&self, name: &str) -> &[Document] {
        self.collections.get(name).map_or(&[], Vec::as_slice)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query_range(
        &self,
        collection: &str,
        field: &str,
        range: &TimeRange,
    ) -> Result<Vec<Document>, DetectionError> {
        let mut hits: Vec<(chrono::DateTime<chrono::Utc>, &Document)> = self
            .collection(collection)
            .iter()
            .filter_map(|doc| {
                let at = doc.data.get(field).and_then(parse_timestamp)?;
                range.contains(at).then_some((at, doc))
            })
            .collect();
        hits.sort_by_key(|(at, _)| *at);
        Ok(hits.into_iter().map(|(_, doc)| doc.clone()).collect())
    }

    async fn list_all(&self, collection: &str) -> Result<Vec<Document>, DetectionError> {
        Ok(self.collection(collection).to_vec())
    }

    async fn get_many(&self, paths: &[String]) -> Result<Vec<Option<Document>>, DetectionError> {
        Ok(paths
            .iter()
            .map(|path| self.by_path.get(path).cloned())
            .collect())
    }

    async fn list_collections(&self, owner: &str) -> Result<Vec<String>, DetectionError> {
        let prefix = format!("{owner}/");
        Ok(self
            .collections
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .cloned()
            .collect())
    }
}
