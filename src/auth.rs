//! OAuth2 client-credentials token exchange.
//!
//! Used by the Spotify pipeline. A response without `access_token` is not an
//! error: it comes back as `Ok(None)` so the orchestrator can stop the run
//! cleanly, while transport failures are retried and finally surface as
//! [`ExtractError::RetryExhausted`].

use std::time::Duration;

use serde_json::Value;
use tracing::{error, info};

use crate::error::ExtractError;
use crate::http::{ApiAuth, ApiClient};
use crate::retry::{retry, RetryPolicy};

/// Total time allowed for one token request.
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

pub struct Authenticator {
    client: ApiClient,
    policy: RetryPolicy,
}

impl Authenticator {
    pub fn new(token_url: &str, policy: RetryPolicy) -> Result<Self, ExtractError> {
        Ok(Self {
            client: ApiClient::new(token_url, ApiAuth::None, Some(TOKEN_TIMEOUT))?,
            policy,
        })
    }

    /// Exchange `creds` for a bearer token.
    pub async fn fetch_token(
        &self,
        creds: &ClientCredentials,
    ) -> Result<Option<String>, ExtractError> {
        info!("Requesting access token from {}", self.client.base_url());
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
        ];

        let body = retry(&self.policy, ExtractError::is_transient, |_| {
            self.client.post_form("", &form)
        })
        .await?;

        Ok(access_token(&body))
    }
}

fn access_token(body: &Value) -> Option<String> {
    match body.get("access_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => {
            info!("Access token received");
            Some(token.to_string())
        }
        _ => {
            error!("Token response had no access_token: {}", body);
            None
        }
    }
}
