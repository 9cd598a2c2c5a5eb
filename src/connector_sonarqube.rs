//! SonarQube code-quality pipeline.
//!
//! Loads the project list, then walks the projects one at a time loading
//! each project's issues, its key measures and (optionally) its security
//! hotspots. All writes merge into existing documents.
//!
//! Authentication is HTTP basic with the API token as username and an empty
//! password. Without a token requests go out anonymously, which only works
//! against servers that allow it.
//!
//! A failing page of a listing keeps what was already fetched; a failing
//! measures request skips that project's measures. Neither stops the run.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use rest_etl_core::models::{ProjectRecord, RawRecord};
use rest_etl_core::store::WriteMode;
use rest_etl_core::transform::{
    transform_hotspots, transform_issues, transform_measures, transform_projects,
    TransformContext,
};

use crate::config::SonarQubeConfig;
use crate::error::ExtractError;
use crate::extract::{Extraction, Paginator};
use crate::http::{ApiAuth, ApiClient};
use crate::load::Loader;
use crate::traits::{Pipeline, RunReport};

pub const PROJECTS_PATH: &str = "/api/projects/search";
pub const ISSUES_PATH: &str = "/api/issues/search";
pub const MEASURES_PATH: &str = "/api/measures/component";
pub const HOTSPOTS_PATH: &str = "/api/hotspots/search";

pub struct SonarQubePipeline {
    client: ApiClient,
    config: SonarQubeConfig,
    paginator: Paginator,
}

impl SonarQubePipeline {
    pub fn new(config: SonarQubeConfig) -> Result<Self> {
        let auth = match config.resolved_token() {
            Some(token) => ApiAuth::TokenAsUsername(token),
            None => {
                warn!("No SonarQube token configured; sending anonymous requests");
                ApiAuth::None
            }
        };
        let client = ApiClient::new(
            config.url.clone(),
            auth,
            config.timeout_secs.map(Duration::from_secs),
        )?;

        Ok(Self {
            client,
            config,
            paginator: Paginator::default(),
        })
    }

    pub fn with_paginator(mut self, paginator: Paginator) -> Self {
        self.paginator = paginator;
        self
    }

    pub async fn projects(&self) -> Extraction {
        info!("Extracting projects...");
        self.paginator.fetch_all(&self.client, PROJECTS_PATH, &[]).await
    }

    pub async fn issues(&self, project_key: &str) -> Extraction {
        info!("Extracting issues for project: {}", project_key);
        let params = [("componentKeys".to_string(), project_key.to_string())];
        self.paginator.fetch_all(&self.client, ISSUES_PATH, &params).await
    }

    pub async fn hotspots(&self, project_key: &str) -> Extraction {
        info!("Extracting hotspots for project: {}", project_key);
        let params = [("projectKey".to_string(), project_key.to_string())];
        self.paginator.fetch_all(&self.client, HOTSPOTS_PATH, &params).await
    }

    /// The `component` object of `/api/measures/component`. One request, no
    /// retry.
    pub async fn measures(&self, project_key: &str) -> Result<RawRecord, ExtractError> {
        info!("Extracting measures for project: {}", project_key);
        let params = [
            ("component".to_string(), project_key.to_string()),
            ("metricKeys".to_string(), self.config.metric_keys.join(",")),
        ];
        let body = self.client.get_json(MEASURES_PATH, &params).await?;
        Ok(body
            .get("component")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    async fn load_project_details(
        &self,
        project: &ProjectRecord,
        loader: &Loader,
        report: &mut RunReport,
    ) {
        let key = project.project_key.as_str();
        let collections = &self.config.collections;

        let issues = self.issues(key).await;
        track_extraction(report, &issues);
        let issue_records = transform_issues(issues.records());
        report.transformed += issue_records.len();
        report.loads.push(
            loader
                .bulk_upsert(&collections.issues, &issue_records, WriteMode::Merge)
                .await,
        );

        match self.measures(key).await {
            Ok(component) => {
                report.extracted += 1;
                if let Some(measures) = transform_measures(&component) {
                    report.transformed += 1;
                    report.loads.push(
                        loader
                            .bulk_upsert(&collections.measures, &[measures], WriteMode::Merge)
                            .await,
                    );
                } else {
                    warn!("No measures returned for project: {}", key);
                }
            }
            Err(e) => error!("Error fetching measures for {}: {}", key, e),
        }

        if self.config.include_hotspots {
            let hotspots = self.hotspots(key).await;
            track_extraction(report, &hotspots);
            let hotspot_records = transform_hotspots(hotspots.records());
            report.transformed += hotspot_records.len();
            report.loads.push(
                loader
                    .bulk_upsert(&collections.hotspots, &hotspot_records, WriteMode::Merge)
                    .await,
            );
        }
    }
}

fn track_extraction(report: &mut RunReport, extraction: &Extraction) {
    report.extracted += extraction.records().len();
    if extraction.is_partial() {
        report.partial_extractions += 1;
    }
}

#[async_trait]
impl Pipeline for SonarQubePipeline {
    fn name(&self) -> &str {
        "sonarqube"
    }

    fn description(&self) -> &str {
        "Projects, issues, measures and hotspots from a SonarQube server"
    }

    async fn run(&self, loader: &Loader, _ctx: &TransformContext) -> Result<RunReport> {
        let mut report = RunReport::new(self.name());
        info!("Starting SonarQube ETL pipeline at {}", self.client.base_url());

        let projects = self.projects().await;
        track_extraction(&mut report, &projects);
        if projects.is_empty() {
            warn!("No projects found. Stopping.");
            return Ok(report.abort("no projects found"));
        }

        let project_records = transform_projects(projects.records());
        report.transformed += project_records.len();
        report.loads.push(
            loader
                .bulk_upsert(
                    &self.config.collections.projects,
                    &project_records,
                    WriteMode::Merge,
                )
                .await,
        );

        for project in &project_records {
            self.load_project_details(project, loader, &mut report).await;
        }

        info!("SonarQube ETL pipeline finished");
        Ok(report)
    }
}
