//! The [`Pipeline`] trait and the report every run produces.
//!
//! Each upstream API gets one pipeline implementation that owns its HTTP
//! clients and runs extract → transform → load once per call to
//! [`run`](Pipeline::run). The store is not owned by the pipeline: it
//! arrives through the [`Loader`] so tests can swap it out.
//!
//! ```text
//!  ┌───────────┐   ┌─────────────┐   ┌────────┐   ┌───────────────┐
//!  │ Extractor │──▶│ Transformer │──▶│ Loader │──▶│ DocumentStore │
//!  └───────────┘   └─────────────┘   └────────┘   └───────────────┘
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use rest_etl_core::transform::TransformContext;

use crate::load::{LoadReport, Loader};

/// One ETL pipeline over one upstream API.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Short identifier used on the command line (e.g. `"nvd"`).
    fn name(&self) -> &str;

    /// One-line description for `etl pipelines`.
    fn description(&self) -> &str;

    /// Run extract → transform → load once.
    ///
    /// Returns `Err` only for failures that must abort the run (for
    /// example, exhausted retries on a mandatory extraction). Running out
    /// of data is a normal, early-aborted [`RunReport`]; store failures
    /// show up in its [`LoadReport`]s.
    async fn run(&self, loader: &Loader, ctx: &TransformContext) -> Result<RunReport>;
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub pipeline: String,
    pub extracted: usize,
    pub transformed: usize,
    pub loads: Vec<LoadReport>,
    /// Set when the run stopped before loading everything it meant to.
    pub aborted: Option<String>,
    /// Extractions that stopped early but still produced data.
    pub partial_extractions: usize,
}

impl RunReport {
    pub fn new(pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            ..Default::default()
        }
    }

    pub fn abort(mut self, reason: impl Into<String>) -> Self {
        self.aborted = Some(reason.into());
        self
    }

    pub fn documents_written(&self) -> u64 {
        self.loads.iter().map(|l| l.inserted + l.modified).sum()
    }

    pub fn failed_loads(&self) -> usize {
        self.loads.iter().filter(|l| !l.is_ok()).count()
    }
}
