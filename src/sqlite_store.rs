//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Every collection shares the `documents` table; a row is one document,
//! addressed by `(collection, natural_key)`. The document itself is stored
//! as JSON text next to a SHA-256 of that text, which lets an upsert tell a
//! real modification from a rewrite of identical content.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use rest_etl_core::models::{document_key, Document};
use rest_etl_core::store::{
    apply_write, content_hash, BulkWriteSummary, CollectionStats, DocumentStore, StoredDocument,
    UpsertOutcome, WriteMode,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_body(collection: &str, key: &str, body: &str) -> Result<Document> {
    serde_json::from_str(body)
        .with_context(|| format!("stored document {}/{} is not a JSON object", collection, key))
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn bulk_upsert(
        &self,
        collection: &str,
        key_field: &str,
        docs: &[Document],
        mode: WriteMode,
    ) -> Result<BulkWriteSummary> {
        let keyed = docs
            .iter()
            .map(|d| document_key(d, key_field).map(|k| (k, d)))
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now().timestamp();
        let mut summary = BulkWriteSummary::default();

        for (key, doc) in keyed {
            let existing = sqlx::query(
                "SELECT body, content_hash FROM documents WHERE collection = ? AND natural_key = ?",
            )
            .bind(collection)
            .bind(&key)
            .fetch_optional(&mut *tx)
            .await?;

            let outcome = match existing {
                None => {
                    let body = serde_json::to_string(doc)?;
                    sqlx::query(
                        r#"
                        INSERT INTO documents (id, collection, natural_key, body, content_hash, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(Uuid::new_v4().to_string())
                    .bind(collection)
                    .bind(&key)
                    .bind(&body)
                    .bind(content_hash(doc))
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                    UpsertOutcome::Inserted
                }
                Some(row) => {
                    let stored_hash: String = row.get("content_hash");
                    let stored = parse_body(collection, &key, row.get("body"))?;
                    let next = apply_write(&stored, doc, mode);
                    let next_hash = content_hash(&next);

                    if next_hash == stored_hash {
                        UpsertOutcome::Unchanged
                    } else {
                        sqlx::query(
                            r#"
                            UPDATE documents SET body = ?, content_hash = ?, updated_at = ?
                            WHERE collection = ? AND natural_key = ?
                            "#,
                        )
                        .bind(serde_json::to_string(&next)?)
                        .bind(&next_hash)
                        .bind(now)
                        .bind(collection)
                        .bind(&key)
                        .execute(&mut *tx)
                        .await?;
                        UpsertOutcome::Modified
                    }
                }
            };
            summary.record(outcome);
        }

        tx.commit().await?;
        Ok(summary)
    }

    async fn find_one(
        &self,
        collection: &str,
        natural_key: &str,
    ) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(
            "SELECT id, body, created_at, updated_at FROM documents WHERE collection = ? AND natural_key = ?",
        )
        .bind(collection)
        .bind(natural_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<StoredDocument> {
            Ok(StoredDocument {
                id: row.get("id"),
                collection: collection.to_string(),
                natural_key: natural_key.to_string(),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
                body: parse_body(collection, natural_key, row.get("body"))?,
            })
        })
        .transpose()
    }

    async fn collections(&self) -> Result<Vec<CollectionStats>> {
        let rows = sqlx::query(
            r#"
            SELECT collection, COUNT(*) AS documents, MAX(updated_at) AS last_updated
            FROM documents
            GROUP BY collection
            ORDER BY collection
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| CollectionStats {
                collection: row.get("collection"),
                documents: row.get("documents"),
                last_updated: row.get("last_updated"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::{db, migrate};
    use serde_json::json;
    use tempfile::TempDir;

    async fn test_store(tmp: &TempDir) -> SqliteStore {
        let config = parse_config(&format!(
            "[db]\npath = \"{}\"\n",
            tmp.path().join("etl.sqlite").display()
        ))
        .unwrap();
        migrate::run_migrations(&config).await.unwrap();
        SqliteStore::new(db::connect(&config).await.unwrap())
    }

    fn doc(v: serde_json::Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_twice_leaves_one_row_with_latest_values() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;

        let first = store
            .bulk_upsert(
                "cves",
                "cve_id",
                &[doc(json!({"cve_id": "CVE-2025-1", "severity": "LOW"}))],
                WriteMode::Replace,
            )
            .await
            .unwrap();
        let second = store
            .bulk_upsert(
                "cves",
                "cve_id",
                &[doc(json!({"cve_id": "CVE-2025-1", "severity": "HIGH"}))],
                WriteMode::Replace,
            )
            .await
            .unwrap();

        assert_eq!(first.inserted, 1);
        assert_eq!(second.modified, 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        let stored = store.find_one("cves", "CVE-2025-1").await.unwrap().unwrap();
        assert_eq!(stored.body["severity"], json!("HIGH"));
    }

    #[tokio::test]
    async fn test_merge_keeps_existing_fields_and_detects_no_change() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;

        store
            .bulk_upsert(
                "measures",
                "project_key",
                &[doc(json!({"project_key": "core", "bugs": 2.0, "coverage": 70.0}))],
                WriteMode::Merge,
            )
            .await
            .unwrap();
        let again = store
            .bulk_upsert(
                "measures",
                "project_key",
                &[doc(json!({"project_key": "core", "bugs": 2.0}))],
                WriteMode::Merge,
            )
            .await
            .unwrap();
        assert_eq!(again.unchanged, 1);

        let stored = store.find_one("measures", "core").await.unwrap().unwrap();
        assert_eq!(stored.body["coverage"], json!(70.0));
    }

    #[tokio::test]
    async fn test_same_key_in_different_collections() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;
        let d = doc(json!({"project_key": "core"}));

        store.replace_one("projects", "project_key", &d).await.unwrap();
        store.replace_one("measures", "project_key", &d).await.unwrap();

        let stats = store.collections().await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].collection, "measures");
        assert_eq!(stats[0].documents, 1);
        assert!(stats[0].last_updated.is_some());
    }

    #[tokio::test]
    async fn test_missing_schema_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let config = parse_config(&format!(
            "[db]\npath = \"{}\"\n",
            tmp.path().join("fresh.sqlite").display()
        ))
        .unwrap();
        let store = SqliteStore::new(db::connect_lazy(&config).unwrap());

        let result = store
            .bulk_upsert("cves", "cve_id", &[doc(json!({"cve_id": "x"}))], WriteMode::Replace)
            .await;
        assert!(result.is_err());
    }
}
