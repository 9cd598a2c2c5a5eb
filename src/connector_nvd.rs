//! NVD CVE 2.0 pipeline.
//!
//! Pulls every CVE published in the last `days` days with a single
//! time-windowed query, flattens each into a [`CveRecord`], and upserts the
//! batch into the CVE collection keyed by `cve_id`.
//!
//! # Configuration
//!
//! ```toml
//! [nvd]
//! base_url = "https://services.nvd.nist.gov/rest/json/cves/2.0"
//! days = 30
//! collection = "cves"
//! ```
//!
//! An API key (`nvd.api_key` or `NVD_API_KEY`) is optional; when present it
//! is sent in the `apiKey` header for NVD's higher rate limit.
//!
//! # Failure policy
//!
//! The query is retried per [`RetryPolicy::time_window`]. When every attempt
//! fails the run returns `Err`, so "extraction failed" is never mistaken for
//! "no CVEs were published".

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use rest_etl_core::models::{CveRecord, RawRecord};
use rest_etl_core::store::WriteMode;
use rest_etl_core::transform::{transform_cves, TransformContext};

use crate::config::NvdConfig;
use crate::error::ExtractError;
use crate::http::{ApiAuth, ApiClient, Query};
use crate::load::Loader;
use crate::retry::{retry, RetryPolicy};
use crate::traits::{Pipeline, RunReport};

/// `[start, end]` publication window in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn last_days(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: now - chrono::Duration::days(i64::from(days)),
            end: now,
        }
    }

    pub fn query(&self, results_per_page: u32) -> Query {
        vec![
            ("pubStartDate".to_string(), format_api_timestamp(self.start)),
            ("pubEndDate".to_string(), format_api_timestamp(self.end)),
            ("resultsPerPage".to_string(), results_per_page.to_string()),
        ]
    }
}

/// NVD's timestamp format: millisecond precision with a literal `Z`.
pub fn format_api_timestamp(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Fetch every vulnerability published inside `window` in one request.
pub async fn fetch_recent_cves(
    client: &ApiClient,
    window: &TimeWindow,
    results_per_page: u32,
    policy: &RetryPolicy,
) -> Result<Vec<RawRecord>, ExtractError> {
    let query = window.query(results_per_page);
    let body = retry(policy, ExtractError::is_transient, |_| {
        client.get_json("", &query)
    })
    .await?;

    let vulnerabilities = body
        .get("vulnerabilities")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if let Some(total) = body.get("totalResults").and_then(Value::as_u64) {
        if total > vulnerabilities.len() as u64 {
            warn!(
                "NVD reported {} results but returned {}; narrow the window to fetch the rest",
                total,
                vulnerabilities.len()
            );
        }
    }

    info!("Extracted {} CVE records", vulnerabilities.len());
    Ok(vulnerabilities)
}

pub struct NvdPipeline {
    client: ApiClient,
    config: NvdConfig,
    policy: RetryPolicy,
}

impl NvdPipeline {
    pub fn new(config: NvdConfig) -> Result<Self> {
        let auth = match config.resolved_api_key() {
            Some(key) => {
                info!("Using API key for NVD requests");
                ApiAuth::Header {
                    name: "apiKey".to_string(),
                    value: key,
                }
            }
            None => ApiAuth::None,
        };
        let client = ApiClient::new(
            config.base_url.clone(),
            auth,
            Some(Duration::from_secs(config.timeout_secs)),
        )?;

        Ok(Self {
            client,
            config,
            policy: RetryPolicy::time_window(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl Pipeline for NvdPipeline {
    fn name(&self) -> &str {
        "nvd"
    }

    fn description(&self) -> &str {
        "Recently published CVEs from the NVD vulnerability database"
    }

    async fn run(&self, loader: &Loader, ctx: &TransformContext) -> Result<RunReport> {
        let mut report = RunReport::new(self.name());
        info!("Extracting CVEs published in the last {} days", self.config.days);

        let window = TimeWindow::last_days(ctx.now, self.config.days);
        let raw = fetch_recent_cves(&self.client, &window, self.config.results_per_page, &self.policy)
            .await
            .context("NVD extraction failed")?;
        report.extracted = raw.len();

        if raw.is_empty() {
            warn!("Stopping: no new CVEs extracted");
            return Ok(report.abort("no CVEs published in the window"));
        }

        let records: Vec<CveRecord> = transform_cves(&raw, ctx);
        info!("Transformed {} CVE records", records.len());
        report.transformed = records.len();

        report.loads.push(
            loader
                .bulk_upsert(&self.config.collection, &records, WriteMode::Replace)
                .await,
        );
        Ok(report)
    }
}
