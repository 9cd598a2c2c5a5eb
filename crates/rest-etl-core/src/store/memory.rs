//! In-memory [`DocumentStore`] implementation for tests and dry runs.
//!
//! Collections are `BTreeMap`s keyed by natural key behind a single
//! `RwLock`, so a batch is applied atomically with respect to readers.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{document_key, Document};

use super::{
    apply_write, content_hash, BulkWriteSummary, CollectionStats, DocumentStore, StoredDocument,
    UpsertOutcome, WriteMode,
};

type Collection = BTreeMap<String, StoredDocument>;

/// In-memory store. Cheap to construct; contents vanish when dropped.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of documents in `collection` (0 if it does not exist).
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn bulk_upsert(
        &self,
        collection: &str,
        key_field: &str,
        docs: &[Document],
        mode: WriteMode,
    ) -> Result<BulkWriteSummary> {
        // Resolve every key before touching the map so a bad document
        // rejects the whole batch.
        let keyed = docs
            .iter()
            .map(|d| document_key(d, key_field).map(|k| (k, d)))
            .collect::<Result<Vec<_>>>()?;

        let mut all = self
            .collections
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        let coll = all.entry(collection.to_string()).or_default();
        let now = Utc::now().timestamp();
        let mut summary = BulkWriteSummary::default();

        for (key, doc) in keyed {
            let outcome = match coll.get_mut(&key) {
                Some(stored) => {
                    let next = apply_write(&stored.body, doc, mode);
                    if content_hash(&next) == content_hash(&stored.body) {
                        UpsertOutcome::Unchanged
                    } else {
                        stored.body = next;
                        stored.updated_at = now;
                        UpsertOutcome::Modified
                    }
                }
                None => {
                    coll.insert(
                        key.clone(),
                        StoredDocument {
                            id: format!("{}:{}", collection, key),
                            collection: collection.to_string(),
                            natural_key: key,
                            created_at: now,
                            updated_at: now,
                            body: doc.clone(),
                        },
                    );
                    UpsertOutcome::Inserted
                }
            };
            summary.record(outcome);
        }

        Ok(summary)
    }

    async fn find_one(
        &self,
        collection: &str,
        natural_key: &str,
    ) -> Result<Option<StoredDocument>> {
        let all = self
            .collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(all
            .get(collection)
            .and_then(|c| c.get(natural_key))
            .cloned())
    }

    async fn collections(&self) -> Result<Vec<CollectionStats>> {
        let all = self
            .collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        let mut stats: Vec<CollectionStats> = all
            .iter()
            .map(|(name, docs)| CollectionStats {
                collection: name.clone(),
                documents: docs.len() as i64,
                last_updated: docs.values().map(|d| d.updated_at).max(),
            })
            .collect();
        stats.sort_by(|a, b| a.collection.cmp(&b.collection));
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_same_record_twice_keeps_one_document() {
        let store = InMemoryStore::new();
        let first = doc(json!({"cve_id": "CVE-1", "severity": "LOW"}));
        let second = doc(json!({"cve_id": "CVE-1", "severity": "HIGH"}));

        let s1 = store
            .bulk_upsert("cves", "cve_id", &[first], WriteMode::Replace)
            .await
            .unwrap();
        let s2 = store
            .bulk_upsert("cves", "cve_id", &[second], WriteMode::Replace)
            .await
            .unwrap();

        assert_eq!(s1.inserted, 1);
        assert_eq!(s2.modified, 1);
        assert_eq!(store.len("cves"), 1);
        let stored = store.find_one("cves", "CVE-1").await.unwrap().unwrap();
        assert_eq!(stored.body["severity"], json!("HIGH"));
    }

    #[tokio::test]
    async fn test_identical_upsert_is_unchanged() {
        let store = InMemoryStore::new();
        let d = doc(json!({"project_key": "core", "name": "Core"}));
        store
            .bulk_upsert("projects", "project_key", &[d.clone()], WriteMode::Merge)
            .await
            .unwrap();
        let again = store
            .bulk_upsert("projects", "project_key", &[d], WriteMode::Merge)
            .await
            .unwrap();
        assert_eq!(again, BulkWriteSummary { inserted: 0, modified: 0, unchanged: 1 });
    }

    #[tokio::test]
    async fn test_merge_mode_preserves_fields() {
        let store = InMemoryStore::new();
        store
            .bulk_upsert(
                "measures",
                "project_key",
                &[doc(json!({"project_key": "core", "bugs": 3.0, "coverage": 80.0}))],
                WriteMode::Merge,
            )
            .await
            .unwrap();
        store
            .bulk_upsert(
                "measures",
                "project_key",
                &[doc(json!({"project_key": "core", "bugs": 1.0}))],
                WriteMode::Merge,
            )
            .await
            .unwrap();
        let stored = store.find_one("measures", "core").await.unwrap().unwrap();
        assert_eq!(stored.body["bugs"], json!(1.0));
        assert_eq!(stored.body["coverage"], json!(80.0));
    }

    #[tokio::test]
    async fn test_keyless_document_rejects_batch() {
        let store = InMemoryStore::new();
        let result = store
            .bulk_upsert(
                "issues",
                "issue_key",
                &[doc(json!({"issue_key": "I-1"})), doc(json!({"message": "no key"}))],
                WriteMode::Merge,
            )
            .await;
        assert!(result.is_err());
        assert!(store.is_empty("issues"));
    }

    #[tokio::test]
    async fn test_replace_one_and_collections() {
        let store = InMemoryStore::new();
        let d = doc(json!({"playlist_id": "p1", "name": "Mix"}));
        assert_eq!(
            store.replace_one("playlists", "playlist_id", &d).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.replace_one("playlists", "playlist_id", &d).await.unwrap(),
            UpsertOutcome::Unchanged
        );
        let stats = store.collections().await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].collection, "playlists");
        assert_eq!(stats[0].documents, 1);
    }
}
