// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::client::error_from_response;
use crate::config::OAuthConfig;
use crate::error::ApiError;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Tokens are refreshed this long before the server says they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// OAuth2 client-credentials token, fetched lazily and reused until expiry.
#[derive(Debug)]
pub struct TokenCache {
    http: reqwest::Client,
    config: OAuthConfig,
    scope: Option<String>,
    token: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(http: reqwest::Client, config: OAuthConfig, scope: Option<&str>) -> Self {
        Self {
            http,
            config,
            scope: scope.map(str::to_string),
            token: Mutex::new(None),
        }
    }

    /// Current access token, fetching a new one when needed.
    pub async fn token(&self) -> Result<String, ApiError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.fetch().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    #[instrument(skip(self), fields(token_url = %self.config.token_url))]
    async fn fetch(&self) -> Result<CachedToken, ApiError> {
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        if let Some(scope) = self.scope.as_deref() {
            form.push(("scope", scope));
        }

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: TokenResponse = response.json().await?;
        debug!("Fetched access token valid for {}s", body.expires_in);
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_MARGIN);
        Ok(CachedToken {
            access_token: body.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}
