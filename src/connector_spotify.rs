//! Spotify playlist pipeline.
//!
//! Authenticates with the client-credentials flow, fetches one playlist and
//! the full details of every track on it, and stores the result as a single
//! `PlaylistRecord` keyed by `playlist_id`.
//!
//! Requires `SPOTIFY_CLIENT_ID` and `SPOTIFY_CLIENT_SECRET` (or the matching
//! `[spotify]` keys). A token response without `access_token` stops the run
//! without error.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use rest_etl_core::models::RawRecord;
use rest_etl_core::transform::{
    playlist_track_ids, transform_playlist, transform_tracks, TransformContext,
};

use crate::auth::{Authenticator, ClientCredentials};
use crate::config::SpotifyConfig;
use crate::error::ExtractError;
use crate::extract::fetch_by_ids;
use crate::http::{ApiAuth, ApiClient};
use crate::load::Loader;
use crate::retry::{retry, RetryPolicy};
use crate::traits::{Pipeline, RunReport};

/// Spotify's `GET /tracks` accepts at most this many ids per request.
pub const TRACKS_BATCH_SIZE: usize = 50;

/// Playlist payload plus every item of its track listing.
#[derive(Debug)]
pub struct PlaylistDetail {
    pub playlist: RawRecord,
    pub items: Vec<RawRecord>,
    /// Set when a follow-up page of the track listing failed.
    pub listing_error: Option<ExtractError>,
}

pub struct SpotifyPipeline {
    config: SpotifyConfig,
    playlist_id: String,
    policy: RetryPolicy,
}

impl SpotifyPipeline {
    pub fn new(config: SpotifyConfig, playlist_id: impl Into<String>) -> Self {
        Self {
            config,
            playlist_id: playlist_id.into(),
            policy: RetryPolicy::token(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn credentials(&self) -> Result<ClientCredentials> {
        let client_id = self
            .config
            .resolved_client_id()
            .ok_or_else(|| anyhow!("Spotify client id missing: set SPOTIFY_CLIENT_ID"))?;
        let client_secret = self
            .config
            .resolved_client_secret()
            .ok_or_else(|| anyhow!("Spotify client secret missing: set SPOTIFY_CLIENT_SECRET"))?;
        Ok(ClientCredentials {
            client_id,
            client_secret,
        })
    }

    fn api_client(&self, token: String) -> Result<ApiClient, ExtractError> {
        ApiClient::new(
            self.config.api_base_url.clone(),
            ApiAuth::Bearer(token),
            Some(Duration::from_secs(self.config.timeout_secs)),
        )
    }
}

/// Fetch `playlists/{id}` and walk its `tracks.next` links.
///
/// The playlist request is retried per `policy` and its failure fails the
/// call. A failing follow-up page keeps the items gathered so far. The walk
/// stops at the first `next` link it has already followed.
pub async fn fetch_playlist(
    client: &ApiClient,
    playlist_id: &str,
    policy: &RetryPolicy,
) -> Result<PlaylistDetail, ExtractError> {
    let path = format!("playlists/{}", playlist_id);
    let playlist = retry(policy, ExtractError::is_transient, |_| {
        client.get_json(&path, &[])
    })
    .await?;

    let mut items = Vec::new();
    let mut listing_error = None;
    let mut followed = HashSet::new();
    let mut page = playlist.get("tracks").cloned().unwrap_or(Value::Null);

    loop {
        if let Some(list) = page.get("items").and_then(Value::as_array) {
            items.extend(list.iter().cloned());
        }
        let Some(next) = page.get("next").and_then(Value::as_str).map(str::to_string) else {
            break;
        };
        if !followed.insert(next.clone()) {
            warn!("Track listing links back to {}; stopping", next);
            break;
        }
        match retry(policy, ExtractError::is_transient, |_| client.get_json(&next, &[])).await {
            Ok(body) => page = body,
            Err(e) => {
                let e = ExtractError::from(e);
                error!("Error following playlist track listing: {}", e);
                listing_error = Some(e);
                break;
            }
        }
    }

    info!(
        "Fetched playlist {} with {} track entries",
        playlist_id,
        items.len()
    );
    Ok(PlaylistDetail {
        playlist,
        items,
        listing_error,
    })
}

#[async_trait]
impl Pipeline for SpotifyPipeline {
    fn name(&self) -> &str {
        "spotify"
    }

    fn description(&self) -> &str {
        "One Spotify playlist with full details of its tracks"
    }

    async fn run(&self, loader: &Loader, ctx: &TransformContext) -> Result<RunReport> {
        let mut report = RunReport::new(self.name());

        let creds = self.credentials()?;
        let auth = Authenticator::new(&self.config.auth_url, self.policy)?;
        let token = auth
            .fetch_token(&creds)
            .await
            .context("Spotify authentication failed")?;
        let Some(token) = token else {
            warn!("Stopping: no Spotify access token");
            return Ok(report.abort("no access token"));
        };

        let client = self.api_client(token)?;
        let detail = fetch_playlist(&client, &self.playlist_id, &self.policy)
            .await
            .with_context(|| format!("Failed to fetch playlist {}", self.playlist_id))?;
        if detail.listing_error.is_some() {
            report.partial_extractions += 1;
        }

        let ids = playlist_track_ids(&detail.items);
        let tracks = if ids.is_empty() {
            warn!("Playlist {} lists no playable tracks", self.playlist_id);
            Vec::new()
        } else {
            info!("Fetching details for {} tracks", ids.len());
            match fetch_by_ids(&client, "tracks", &ids, "tracks", TRACKS_BATCH_SIZE).await {
                Ok(tracks) => tracks,
                Err(e) => {
                    error!("Failed to fetch track details: {}", e);
                    return Ok(report.abort("track details unavailable"));
                }
            }
        };
        report.extracted = 1 + tracks.len();

        let track_records = transform_tracks(&tracks, ctx);
        let Some(record) = transform_playlist(&detail.playlist, track_records) else {
            return Ok(report.abort("playlist payload had no id"));
        };
        report.transformed = 1 + record.tracks.len();

        report
            .loads
            .push(loader.upsert_one(&self.config.collection, &record).await);
        Ok(report)
    }
}
