//! TOML configuration.
//!
//! One file configures the store and every pipeline. A pipeline whose
//! section is absent is simply not available to `etl run`.
//!
//! Credentials may live in the file, but are normally left out and read from
//! the environment at run time:
//!
//! | Setting | Environment variable |
//! |---------|----------------------|
//! | `nvd.api_key` | `NVD_API_KEY` (optional) |
//! | `spotify.client_id` | `SPOTIFY_CLIENT_ID` |
//! | `spotify.client_secret` | `SPOTIFY_CLIENT_SECRET` |
//! | `sonarqube.token` | `SONARQUBE_API_TOKEN` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Longest publication-date range the NVD API accepts in one query.
pub const NVD_MAX_WINDOW_DAYS: u32 = 120;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub nvd: Option<NvdConfig>,
    #[serde(default)]
    pub spotify: Option<SpotifyConfig>,
    #[serde(default)]
    pub sonarqube: Option<SonarQubeConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NvdConfig {
    #[serde(default = "default_nvd_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_nvd_days")]
    pub days: u32,
    #[serde(default = "default_nvd_results_per_page")]
    pub results_per_page: u32,
    #[serde(default = "default_nvd_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cve_collection")]
    pub collection: String,
}

fn default_nvd_base_url() -> String {
    "https://services.nvd.nist.gov/rest/json/cves/2.0".to_string()
}
fn default_nvd_days() -> u32 {
    30
}
fn default_nvd_results_per_page() -> u32 {
    2000
}
fn default_nvd_timeout_secs() -> u64 {
    60
}
fn default_cve_collection() -> String {
    "cves".to_string()
}

impl NvdConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_secret(&self.api_key, "NVD_API_KEY")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpotifyConfig {
    #[serde(default = "default_spotify_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_spotify_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_spotify_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_playlist_collection")]
    pub collection: String,
}

fn default_spotify_auth_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}
fn default_spotify_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}
fn default_spotify_timeout_secs() -> u64 {
    10
}
fn default_playlist_collection() -> String {
    "playlists".to_string()
}

impl SpotifyConfig {
    pub fn resolved_client_id(&self) -> Option<String> {
        resolve_secret(&self.client_id, "SPOTIFY_CLIENT_ID")
    }

    pub fn resolved_client_secret(&self) -> Option<String> {
        resolve_secret(&self.client_secret, "SPOTIFY_CLIENT_SECRET")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SonarQubeConfig {
    #[serde(default = "default_sonarqube_url")]
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Per-request timeout. Unset means requests wait indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_metric_keys")]
    pub metric_keys: Vec<String>,
    #[serde(default = "default_true")]
    pub include_hotspots: bool,
    #[serde(default)]
    pub collections: SonarQubeCollections,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SonarQubeCollections {
    #[serde(default = "default_projects_collection")]
    pub projects: String,
    #[serde(default = "default_issues_collection")]
    pub issues: String,
    #[serde(default = "default_measures_collection")]
    pub measures: String,
    #[serde(default = "default_hotspots_collection")]
    pub hotspots: String,
}

impl Default for SonarQubeCollections {
    fn default() -> Self {
        Self {
            projects: default_projects_collection(),
            issues: default_issues_collection(),
            measures: default_measures_collection(),
            hotspots: default_hotspots_collection(),
        }
    }
}

fn default_sonarqube_url() -> String {
    "http://localhost:9000".to_string()
}
fn default_metric_keys() -> Vec<String> {
    ["bugs", "vulnerabilities", "code_smells", "coverage", "duplicated_lines_density"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_true() -> bool {
    true
}
fn default_projects_collection() -> String {
    "projects".to_string()
}
fn default_issues_collection() -> String {
    "issues".to_string()
}
fn default_measures_collection() -> String {
    "measures".to_string()
}
fn default_hotspots_collection() -> String {
    "hotspots".to_string()
}

impl SonarQubeConfig {
    pub fn resolved_token(&self) -> Option<String> {
        resolve_secret(&self.token, "SONARQUBE_API_TOKEN")
    }
}

/// Prefer the value from the file; fall back to the environment. Empty
/// strings count as unset.
fn resolve_secret(configured: &Option<String>, env_var: &str) -> Option<String> {
    configured
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|s| !s.is_empty()))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if let Some(nvd) = &config.nvd {
        if nvd.base_url.trim().is_empty() {
            bail!("nvd.base_url must not be empty");
        }
        if nvd.days == 0 || nvd.days > NVD_MAX_WINDOW_DAYS {
            bail!("nvd.days must be in 1..={}", NVD_MAX_WINDOW_DAYS);
        }
        if nvd.results_per_page == 0 {
            bail!("nvd.results_per_page must be > 0");
        }
    }

    if let Some(spotify) = &config.spotify {
        if spotify.auth_url.trim().is_empty() || spotify.api_base_url.trim().is_empty() {
            bail!("spotify.auth_url and spotify.api_base_url must not be empty");
        }
    }

    if let Some(sonar) = &config.sonarqube {
        if sonar.url.trim().is_empty() {
            bail!("sonarqube.url must not be empty");
        }
        if sonar.metric_keys.is_empty() {
            bail!("sonarqube.metric_keys must list at least one metric");
        }
    }

    Ok(config)
}
