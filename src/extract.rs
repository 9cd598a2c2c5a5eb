//! Shared extraction modes.
//!
//! - **Paginated**: walk `?p=1&ps=100`, `?p=2&ps=100`, ... until the server
//!   runs out of records, concatenating each page's record list. A failing
//!   page ends the walk but keeps what was already fetched.
//! - **By id**: fetch full records for a list of ids with comma-joined
//!   `ids=` batches. No retry; any failure fails the call.
//!
//! The time-windowed NVD query lives in [`crate::connector_nvd`].

use serde_json::Value;
use tracing::{error, info};

use crate::error::ExtractError;
use crate::http::{ApiClient, Query};
use rest_etl_core::models::RawRecord;

/// Container keys a paginated SonarQube response may list its records under.
pub const CONTAINER_KEYS: [&str; 4] = ["components", "issues", "projects", "hotspots"];

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Outcome of a list extraction.
#[derive(Debug)]
pub enum Extraction {
    /// Every page was fetched and at least one record came back.
    Complete(Vec<RawRecord>),
    /// The server reported no records.
    Empty,
    /// A page failed; `records` holds everything gathered before it.
    Partial {
        records: Vec<RawRecord>,
        error: ExtractError,
    },
}

impl Extraction {
    pub fn records(&self) -> &[RawRecord] {
        match self {
            Extraction::Complete(r) | Extraction::Partial { records: r, .. } => r,
            Extraction::Empty => &[],
        }
    }

    pub fn into_records(self) -> Vec<RawRecord> {
        match self {
            Extraction::Complete(r) | Extraction::Partial { records: r, .. } => r,
            Extraction::Empty => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Extraction::Partial { .. })
    }
}

/// Page-numbered pagination settings.
#[derive(Debug, Clone)]
pub struct Paginator {
    pub page_param: &'static str,
    pub size_param: &'static str,
    pub page_size: u32,
    pub container_keys: &'static [&'static str],
}

impl Default for Paginator {
    /// SonarQube's `p` / `ps` convention with 100 records per page.
    fn default() -> Self {
        Self {
            page_param: "p",
            size_param: "ps",
            page_size: DEFAULT_PAGE_SIZE,
            container_keys: &CONTAINER_KEYS,
        }
    }
}

impl Paginator {
    /// Query for `page` (1-based): the caller's params plus page and size.
    pub fn page_query(&self, params: &[(String, String)], page: u32) -> Query {
        let mut query: Query = params
            .iter()
            .filter(|(k, _)| k != self.page_param && k != self.size_param)
            .cloned()
            .collect();
        query.push((self.page_param.to_string(), page.to_string()));
        query.push((self.size_param.to_string(), self.page_size.to_string()));
        query
    }

    /// First container key present in `body`, with its record list.
    pub fn page_records<'a>(&self, body: &'a Value) -> Option<&'a Vec<Value>> {
        self.container_keys
            .iter()
            .find_map(|k| body.get(*k))
            .and_then(Value::as_array)
    }

    /// True once `page` pages of `page_size` cover the reported total.
    pub fn is_last_page(&self, page: u32, body: &Value) -> bool {
        let total = body
            .get("paging")
            .and_then(|p| p.get("total"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        u64::from(page) * u64::from(self.page_size) >= total
    }

    /// Fetch every page of `path`, in page order.
    pub async fn fetch_all(
        &self,
        client: &ApiClient,
        path: &str,
        params: &[(String, String)],
    ) -> Extraction {
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let query = self.page_query(params, page);
            let body = match client.get_json(path, &query).await {
                Ok(body) => body,
                Err(e) => {
                    error!("Error fetching page {} of {}: {}", page, client.url(path), e);
                    return Extraction::Partial { records, error: e };
                }
            };

            match self.page_records(&body) {
                Some(list) if !list.is_empty() => records.extend(list.iter().cloned()),
                _ => break,
            }

            if self.is_last_page(page, &body) {
                break;
            }
            page += 1;
        }

        info!("Fetched {} records from {} in {} page(s)", records.len(), path, page);
        if records.is_empty() {
            Extraction::Empty
        } else {
            Extraction::Complete(records)
        }
    }
}

/// Fetch full records for `ids` from a batch endpoint such as Spotify's
/// `GET /tracks?ids=a,b,c`.
///
/// Ids are sent `batch_size` at a time; records come back in id order under
/// `container_key`. Any failure aborts the whole call without retry.
pub async fn fetch_by_ids(
    client: &ApiClient,
    path: &str,
    ids: &[String],
    container_key: &str,
    batch_size: usize,
) -> Result<Vec<RawRecord>, ExtractError> {
    let mut records = Vec::with_capacity(ids.len());
    for batch in ids.chunks(batch_size.max(1)) {
        let query = vec![("ids".to_string(), batch.join(","))];
        let body = client.get_json(path, &query).await?;
        if let Some(list) = body.get(container_key).and_then(Value::as_array) {
            records.extend(list.iter().filter(|r| !r.is_null()).cloned());
        }
    }
    Ok(records)
}
