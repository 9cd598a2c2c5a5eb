//! # REST ETL CLI (`etl`)
//!
//! Runs the ETL pipelines and inspects what they stored.
//!
//! ## Usage
//!
//! ```bash
//! etl --config ./config/etl.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `etl init` | Create the SQLite database and schema |
//! | `etl pipelines` | List pipelines and whether they are configured |
//! | `etl run nvd [--days N]` | Load CVEs published in the last N days |
//! | `etl run spotify <PLAYLIST_ID>` | Load one playlist with its tracks |
//! | `etl run sonarqube` | Load projects, issues, measures and hotspots |
//! | `etl get <COLLECTION> <KEY>` | Print one stored document |
//! | `etl stats` | Document counts per collection |
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `info`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rest_etl::ingest::PipelineTarget;
use rest_etl::{config, get, ingest, migrate, pipelines, stats};

/// REST ETL: pull records from REST APIs into a local document store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/etl.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "etl",
    about = "REST ETL — pull records from REST APIs into a local document store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/etl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `documents` table.
    /// Safe to run repeatedly.
    Init,

    /// List pipelines and whether each is configured.
    Pipelines,

    /// Run one pipeline: extract, transform and load.
    Run {
        #[command(subcommand)]
        pipeline: RunPipeline,
    },

    /// Print a stored document.
    Get {
        /// Collection name (e.g. `cves`, `issues`).
        collection: String,
        /// Natural key of the document (e.g. `CVE-2025-0001`).
        key: String,
    },

    /// Show document counts per collection.
    Stats,
}

#[derive(Subcommand)]
enum RunPipeline {
    /// Recently published CVEs from NVD.
    Nvd {
        /// Publication window in days (1-120). Overrides `nvd.days`.
        #[arg(long)]
        days: Option<u32>,
    },
    /// One Spotify playlist with its tracks.
    Spotify {
        /// Spotify playlist id.
        playlist_id: String,
    },
    /// Projects, issues, measures and hotspots from SonarQube.
    Sonarqube,
}

impl From<RunPipeline> for PipelineTarget {
    fn from(p: RunPipeline) -> Self {
        match p {
            RunPipeline::Nvd { days } => PipelineTarget::Nvd { days },
            RunPipeline::Spotify { playlist_id } => PipelineTarget::Spotify { playlist_id },
            RunPipeline::Sonarqube => PipelineTarget::SonarQube,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Pipelines => {
            pipelines::list_pipelines(&cfg)?;
        }
        Commands::Run { pipeline } => {
            ingest::run_pipeline(&cfg, &pipeline.into()).await?;
        }
        Commands::Get { collection, key } => {
            get::run_get(&cfg, &collection, &key).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
