//! Document store abstraction.
//!
//! The [`DocumentStore`] trait is the only way pipelines persist data. A
//! store holds named collections of schema-less [`Document`]s, each
//! addressed by a natural key that must be unique within its collection.
//! Backends are expected to enforce that uniqueness themselves (the SQLite
//! backend declares `UNIQUE(collection, natural_key)`).
//!
//! Implementations must be `Send + Sync` so a single handle can be shared
//! through an `Arc` for the duration of a run.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::Document;

/// How an upsert treats a document that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Overwrite the fields present in the incoming document; fields the
    /// incoming document lacks keep their stored values.
    Merge,
    /// Swap the stored document for the incoming one.
    Replace,
}

/// Result of upserting a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Modified,
    /// Matched an existing document whose content did not change.
    Unchanged,
}

/// Counts reported by a batched upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkWriteSummary {
    pub inserted: u64,
    pub modified: u64,
    pub unchanged: u64,
}

impl BulkWriteSummary {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Modified => self.modified += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.inserted + self.modified + self.unchanged
    }
}

/// A document as read back from the store, with bookkeeping columns.
#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    pub id: String,
    pub collection: String,
    pub natural_key: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub body: Document,
}

/// Per-collection document counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub collection: String,
    pub documents: i64,
    pub last_updated: Option<i64>,
}

/// Abstract document store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`bulk_upsert`](DocumentStore::bulk_upsert) | Upsert many documents as one batch |
/// | [`replace_one`](DocumentStore::replace_one) | Replace-or-insert a single document |
/// | [`find_one`](DocumentStore::find_one) | Fetch a document by natural key |
/// | [`collections`](DocumentStore::collections) | List collections with counts |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upsert every document in `docs`, matching on `key_field`, as a
    /// single batch. Either the whole batch is applied or none of it is.
    async fn bulk_upsert(
        &self,
        collection: &str,
        key_field: &str,
        docs: &[Document],
        mode: WriteMode,
    ) -> Result<BulkWriteSummary>;

    /// Replace the document matching `doc[key_field]`, or insert it.
    async fn replace_one(
        &self,
        collection: &str,
        key_field: &str,
        doc: &Document,
    ) -> Result<UpsertOutcome> {
        let summary = self
            .bulk_upsert(collection, key_field, std::slice::from_ref(doc), WriteMode::Replace)
            .await?;
        Ok(if summary.inserted > 0 {
            UpsertOutcome::Inserted
        } else if summary.modified > 0 {
            UpsertOutcome::Modified
        } else {
            UpsertOutcome::Unchanged
        })
    }

    async fn find_one(&self, collection: &str, natural_key: &str)
        -> Result<Option<StoredDocument>>;

    async fn collections(&self) -> Result<Vec<CollectionStats>>;
}

/// Apply `incoming` on top of `existing` according to `mode`.
pub fn apply_write(existing: &Document, incoming: &Document, mode: WriteMode) -> Document {
    match mode {
        WriteMode::Replace => incoming.clone(),
        WriteMode::Merge => {
            let mut merged = existing.clone();
            for (k, v) in incoming {
                merged.insert(k.clone(), v.clone());
            }
            merged
        }
    }
}

/// SHA-256 of a document's canonical JSON text.
///
/// `serde_json::Map` keeps keys sorted, so equal documents hash equally
/// regardless of field insertion order.
pub fn content_hash(doc: &Document) -> String {
    let mut hasher = Sha256::new();
    // Serializing a Map<String, Value> cannot fail.
    hasher.update(serde_json::to_vec(doc).unwrap_or_default());
    format!("{:x}", hasher.finalize())
}
