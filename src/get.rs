//! Document retrieval by collection and natural key.
//!
//! Used by `etl get <COLLECTION> <KEY>` to inspect what a pipeline stored.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;

use rest_etl_core::store::{DocumentStore, StoredDocument};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;
use crate::stats::format_ts_iso;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub collection: String,
    pub key: String,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
    pub body: Value,
}

impl From<StoredDocument> for DocumentResponse {
    fn from(doc: StoredDocument) -> Self {
        Self {
            id: doc.id,
            collection: doc.collection,
            key: doc.natural_key,
            created_at: format_ts_iso(doc.created_at),
            updated_at: format_ts_iso(doc.updated_at),
            body: Value::Object(doc.body),
        }
    }
}

pub async fn get_document(
    store: &dyn DocumentStore,
    collection: &str,
    key: &str,
) -> Result<DocumentResponse> {
    match store.find_one(collection, key).await? {
        Some(doc) => Ok(doc.into()),
        None => bail!("document not found: {}/{}", collection, key),
    }
}

/// CLI entry point: look the document up and print it to stdout.
pub async fn run_get(config: &Config, collection: &str, key: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let doc = get_document(&store, collection, key).await;
    pool.close().await;
    let doc = doc?;

    println!("--- Document ---");
    println!("id:          {}", doc.id);
    println!("collection:  {}", doc.collection);
    println!("key:         {}", doc.key);
    println!("created_at:  {}", doc.created_at);
    println!("updated_at:  {}", doc.updated_at);
    println!();
    println!("--- Body ---");
    println!("{}", serde_json::to_string_pretty(&doc.body)?);

    Ok(())
}
