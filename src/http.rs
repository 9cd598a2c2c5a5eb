//! Thin JSON-over-HTTP client shared by every pipeline.
//!
//! Wraps a [`reqwest::Client`] with a base URL, one of the upstream APIs'
//! auth conventions, and an optional per-request timeout. Every call maps
//! failures into [`ExtractError`] so callers can decide what to retry.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use crate::error::ExtractError;

/// How requests authenticate against an upstream API.
#[derive(Debug, Clone)]
pub enum ApiAuth {
    None,
    /// `Authorization: Bearer <token>` (Spotify).
    Bearer(String),
    /// HTTP basic auth with the API token as username and an empty password
    /// (SonarQube).
    TokenAsUsername(String),
    /// A custom header carrying an API key (NVD's `apiKey`).
    Header { name: String, value: String },
}

/// Query parameters as owned `(name, value)` pairs.
pub type Query = Vec<(String, String)>;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: ApiAuth,
}

impl ApiClient {
    /// Build a client. `timeout` bounds each request end to end; `None`
    /// leaves requests unbounded.
    pub fn new(
        base_url: impl Into<String>,
        auth: ApiAuth,
        timeout: Option<Duration>,
    ) -> Result<Self, ExtractError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("rest-etl/", env!("CARGO_PKG_VERSION")));
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve `path` against the base URL. Absolute URLs (e.g. a
    /// pagination `next` link) pass through untouched; an empty path
    /// addresses the base URL itself.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    pub async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<Value, ExtractError> {
        let url = self.url(path);
        debug!("GET {} {:?}", url, query);
        let req = self.authorize(self.http.get(&url).query(query));
        Self::send(&url, req).await
    }

    /// POST an `application/x-www-form-urlencoded` body.
    pub async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<Value, ExtractError> {
        let url = self.url(path);
        debug!("POST {}", url);
        let req = self.authorize(self.http.post(&url).form(form));
        Self::send(&url, req).await
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            ApiAuth::None => req,
            ApiAuth::Bearer(token) => req.bearer_auth(token),
            ApiAuth::TokenAsUsername(token) => req.basic_auth(token, Some("")),
            ApiAuth::Header { name, value } => req.header(name.as_str(), value.as_str()),
        }
    }

    async fn send(url: &str, req: RequestBuilder) -> Result<Value, ExtractError> {
        let response = req.send().await.map_err(|source| ExtractError::Network {
            url: url.to_string(),
            source,
        })?;
        Self::read_json(url, response).await
    }

    async fn read_json(url: &str, response: Response) -> Result<Value, ExtractError> {
        let status = response.status();
        let body = response.text().await.map_err(|source| ExtractError::Network {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            return Err(ExtractError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        serde_json::from_str(&body).map_err(|source| ExtractError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
