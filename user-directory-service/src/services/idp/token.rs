//! Admin access tokens via the OAuth2 client-credentials grant.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::observability::TracedClientExt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::IdpError;

/// Seconds shaved off `expires_in` so a token is never used right at expiry.
const EXPIRY_SKEW_SECS: u64 = 30;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 60;

/// Source of bearer tokens for admin API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, IdpError>;

    /// Drop any cached token so the next call fetches a fresh one.
    async fn invalidate(&self);
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    /// `None` when the token is too short-lived to be worth caching.
    fn new(value: String, expires_in: Option<u64>, now: Instant) -> Option<Self> {
        let lifetime = expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .saturating_sub(EXPIRY_SKEW_SECS);
        if lifetime == 0 {
            return None;
        }
        Some(Self {
            value,
            expires_at: now + Duration::from_secs(lifetime),
        })
    }

    fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Fetches tokens from the realm's token endpoint and caches them until
/// shortly before they expire.
pub struct ClientCredentialsTokenProvider {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: Secret<String>,
    cache: Mutex<Option<CachedToken>>,
}

impl ClientCredentialsTokenProvider {
    pub fn new(
        client: Client,
        token_url: String,
        client_id: String,
        client_secret: Secret<String>,
    ) -> Self {
        Self {
            client,
            token_url,
            client_id,
            client_secret,
            cache: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<TokenResponse, IdpError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "client_credentials"),
            ("client_secret", self.client_secret.expose_secret().as_str()),
        ];

        let response = self
            .client
            .traced_post(&self.token_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = %status, client_id = %self.client_id, "Admin token request rejected");
            return Err(IdpError::Token(format!("{}: {}", status, body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| IdpError::Token(format!("malformed token response: {}", e)))
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsTokenProvider {
    async fn access_token(&self) -> Result<String, IdpError> {
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.as_ref().filter(|t| t.is_valid_at(Instant::now())) {
            return Ok(token.value.clone());
        }

        let response = self.fetch().await?;
        tracing::debug!(expires_in = ?response.expires_in, "Fetched admin access token");

        *cache = CachedToken::new(response.access_token.clone(), response.expires_in, Instant::now());
        Ok(response.access_token)
    }

    async fn invalidate(&self) {
        self.cache.lock().await.take();
    }
}
