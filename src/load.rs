//! Loading transformed records into the document store.
//!
//! The [`Loader`] never fails: store errors (unreachable database, missing
//! schema, bad documents) are logged and recorded in the returned
//! [`LoadReport`], and the run carries on.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use rest_etl_core::models::{Document, Record};
use rest_etl_core::store::{BulkWriteSummary, DocumentStore, WriteMode};

/// What one load call did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub collection: String,
    pub attempted: usize,
    pub inserted: u64,
    pub modified: u64,
    pub unchanged: u64,
    pub error: Option<String>,
}

impl LoadReport {
    fn new(collection: &str, attempted: usize) -> Self {
        Self {
            collection: collection.to_string(),
            attempted,
            ..Default::default()
        }
    }

    fn with_summary(mut self, summary: BulkWriteSummary) -> Self {
        self.inserted = summary.inserted;
        self.modified = summary.modified;
        self.unchanged = summary.unchanged;
        self
    }

    fn with_error(mut self, err: impl std::fmt::Display) -> Self {
        self.error = Some(err.to_string());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Writes records through an injected [`DocumentStore`].
#[derive(Clone)]
pub struct Loader {
    store: Arc<dyn DocumentStore>,
}

impl Loader {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Upsert all `records` into `collection` as one batch, keyed by
    /// `R::KEY_FIELD`.
    pub async fn bulk_upsert<R: Record>(
        &self,
        collection: &str,
        records: &[R],
        mode: WriteMode,
    ) -> LoadReport {
        let report = LoadReport::new(collection, records.len());
        if records.is_empty() {
            warn!("No data provided to load into '{}'", collection);
            return report;
        }

        let docs = match records
            .iter()
            .map(R::to_document)
            .collect::<anyhow::Result<Vec<Document>>>()
        {
            Ok(docs) => docs,
            Err(e) => {
                error!("Could not serialize records for '{}': {}", collection, e);
                return report.with_error(e);
            }
        };

        info!("Upserting {} documents into '{}'", docs.len(), collection);
        match self
            .store
            .bulk_upsert(collection, R::KEY_FIELD, &docs, mode)
            .await
        {
            Ok(summary) => {
                info!(
                    "Bulk write to '{}' complete. Inserted: {}, Modified: {}, Unchanged: {}",
                    collection, summary.inserted, summary.modified, summary.unchanged
                );
                report.with_summary(summary)
            }
            Err(e) => {
                error!("Error during bulk write to '{}': {:#}", collection, e);
                report.with_error(format!("{:#}", e))
            }
        }
    }

    /// Replace-or-insert a single record keyed by `R::KEY_FIELD`.
    pub async fn upsert_one<R: Record>(&self, collection: &str, record: &R) -> LoadReport {
        let report = LoadReport::new(collection, 1);
        let doc = match record.to_document() {
            Ok(doc) => doc,
            Err(e) => {
                error!("Could not serialize record for '{}': {}", collection, e);
                return report.with_error(e);
            }
        };

        match self.store.replace_one(collection, R::KEY_FIELD, &doc).await {
            Ok(outcome) => {
                info!(
                    "Upserted {}={} into '{}' ({:?})",
                    R::KEY_FIELD,
                    record.natural_key(),
                    collection,
                    outcome
                );
                let mut summary = BulkWriteSummary::default();
                summary.record(outcome);
                report.with_summary(summary)
            }
            Err(e) => {
                error!("Error upserting into '{}': {:#}", collection, e);
                report.with_error(format!("{:#}", e))
            }
        }
    }
}
