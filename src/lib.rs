//! # REST ETL
//!
//! Extract-transform-load pipelines that pull records from REST APIs,
//! flatten them into typed documents, and upsert them into a local document
//! store keyed by each record's natural key.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────┐   ┌──────────┐
//! │  Pipelines   │──▶│  Transform  │──▶│  Loader  │──▶│  SQLite  │
//! │ NVD/Spotify/ │   │ (pure, in   │   │  upsert  │   │documents │
//! │  SonarQube   │   │  core crate)│   │          │   │          │
//! └──────┬───────┘   └─────────────┘   └──────────┘   └──────────┘
//!        │ http + retry + pagination
//!        ▼
//!   upstream REST APIs
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! etl init                      # create database
//! etl pipelines                 # check which pipelines are configured
//! etl run nvd --days 7          # CVEs published in the last week
//! etl run spotify 37i9dQZF1DXcBWIGoYBM5M
//! etl run sonarqube
//! etl get cves CVE-2025-0001
//! etl stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`http`] | JSON-over-HTTP client with per-API auth |
//! | [`retry`] | Retry policy and exponential backoff |
//! | [`auth`] | OAuth2 client-credentials token exchange |
//! | [`extract`] | Paginated and by-id extraction |
//! | [`load`] | Upserting records into the store |
//! | [`connector_nvd`] | NVD CVE pipeline |
//! | [`connector_spotify`] | Spotify playlist pipeline |
//! | [`connector_sonarqube`] | SonarQube pipeline |
//! | [`ingest`] | Run orchestration |
//! | [`sqlite_store`] | SQLite document store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod auth;
pub mod config;
pub mod connector_nvd;
pub mod connector_sonarqube;
pub mod connector_spotify;
pub mod db;
pub mod error;
pub mod extract;
pub mod get;
pub mod http;
pub mod ingest;
pub mod load;
pub mod migrate;
pub mod pipelines;
pub mod retry;
pub mod sqlite_store;
pub mod stats;
pub mod traits;
