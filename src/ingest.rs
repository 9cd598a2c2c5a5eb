//! Pipeline run orchestration.
//!
//! Resolves a [`PipelineTarget`] against the configuration, wires the
//! pipeline to a [`Loader`] over the SQLite store, runs it once, and prints
//! the run summary. Used by `etl run <pipeline>`.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use tracing::info;

use rest_etl_core::transform::TransformContext;

use crate::config::{Config, NVD_MAX_WINDOW_DAYS};
use crate::connector_nvd::NvdPipeline;
use crate::connector_sonarqube::SonarQubePipeline;
use crate::connector_spotify::SpotifyPipeline;
use crate::db;
use crate::load::Loader;
use crate::sqlite_store::SqliteStore;
use crate::traits::{Pipeline, RunReport};

/// Which pipeline to run, with its command-line arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineTarget {
    Nvd { days: Option<u32> },
    Spotify { playlist_id: String },
    SonarQube,
}

/// Build the pipeline for `target` from its config section.
pub fn build_pipeline(config: &Config, target: &PipelineTarget) -> Result<Box<dyn Pipeline>> {
    let pipeline: Box<dyn Pipeline> = match target {
        PipelineTarget::Nvd { days } => {
            let mut nvd = config
                .nvd
                .clone()
                .ok_or_else(|| anyhow!("No [nvd] section in config"))?;
            if let Some(days) = *days {
                if days == 0 || days > NVD_MAX_WINDOW_DAYS {
                    bail!("--days must be in 1..={}", NVD_MAX_WINDOW_DAYS);
                }
                nvd.days = days;
            }
            Box::new(NvdPipeline::new(nvd)?)
        }
        PipelineTarget::Spotify { playlist_id } => {
            if playlist_id.trim().is_empty() {
                bail!("playlist id must not be empty");
            }
            let spotify = config
                .spotify
                .clone()
                .ok_or_else(|| anyhow!("No [spotify] section in config"))?;
            Box::new(SpotifyPipeline::new(spotify, playlist_id.trim()))
        }
        PipelineTarget::SonarQube => {
            let sonar = config
                .sonarqube
                .clone()
                .ok_or_else(|| anyhow!("No [sonarqube] section in config"))?;
            Box::new(SonarQubePipeline::new(sonar)?)
        }
    };
    Ok(pipeline)
}

/// Run one pipeline against an already-built loader.
pub async fn execute(
    pipeline: &dyn Pipeline,
    loader: &Loader,
    ctx: &TransformContext,
) -> Result<RunReport> {
    info!("--- Starting {} ETL pipeline ---", pipeline.name());
    let report = pipeline.run(loader, ctx).await?;
    info!(
        "--- {} ETL pipeline finished: {} documents written ---",
        pipeline.name(),
        report.documents_written()
    );
    Ok(report)
}

/// CLI entry point for `etl run`.
pub async fn run_pipeline(config: &Config, target: &PipelineTarget) -> Result<RunReport> {
    let pipeline = build_pipeline(config, target)?;

    // Lazy so an unreachable database surfaces in the load reports.
    let pool = db::connect_lazy(config)?;
    let loader = Loader::new(Arc::new(SqliteStore::new(pool.clone())));
    let ctx = TransformContext::new(Utc::now());

    let report = execute(pipeline.as_ref(), &loader, &ctx).await;
    pool.close().await;
    let report = report?;

    print_report(&report);
    Ok(report)
}

pub fn print_report(report: &RunReport) {
    println!("run {}", report.pipeline);
    println!("  extracted: {}", report.extracted);
    println!("  transformed: {}", report.transformed);
    if report.partial_extractions > 0 {
        println!("  partial extractions: {}", report.partial_extractions);
    }
    for load in &report.loads {
        match &load.error {
            None => println!(
                "  {:<12} inserted {}, modified {}, unchanged {}",
                load.collection, load.inserted, load.modified, load.unchanged
            ),
            Some(e) => println!("  {:<12} FAILED: {}", load.collection, e),
        }
    }
    match &report.aborted {
        Some(reason) => println!("stopped: {}", reason),
        None if report.failed_loads() > 0 => {
            println!("done with {} failed load(s)", report.failed_loads())
        }
        None => println!("ok"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn config(extra: &str) -> Config {
        parse_config(&format!("[db]\npath = \"./data/etl.sqlite\"\n{}", extra)).unwrap()
    }

    #[test]
    fn test_missing_section_is_an_error() {
        let cfg = config("");
        let err = build_pipeline(&cfg, &PipelineTarget::SonarQube).err().unwrap();
        assert!(err.to_string().contains("[sonarqube]"));
    }

    #[test]
    fn test_days_override_is_validated() {
        let cfg = config("[nvd]\n");
        assert!(build_pipeline(&cfg, &PipelineTarget::Nvd { days: Some(0) }).is_err());
        assert!(build_pipeline(&cfg, &PipelineTarget::Nvd { days: Some(121) }).is_err());

        let pipeline = build_pipeline(&cfg, &PipelineTarget::Nvd { days: Some(7) }).unwrap();
        assert_eq!(pipeline.name(), "nvd");
    }

    #[test]
    fn test_blank_playlist_id_is_rejected() {
        let cfg = config("[spotify]\n");
        let target = PipelineTarget::Spotify {
            playlist_id: "  ".to_string(),
        };
        assert!(build_pipeline(&cfg, &target).is_err());
    }
}
