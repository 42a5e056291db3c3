//! Bearer token providers for Kommo.
//!
//! Long-lived tokens and API keys are served as-is. OAuth client-credentials
//! tokens are cached in memory with their expiry and refreshed once fewer
//! than [`REFRESH_MARGIN`] remain.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use linebridge_core::{BridgeError, TokenProvider};
use linebridge_logging::truncate_for_log;

const SERVICE: &str = "kommo-oauth";

/// Refresh when the cached token has less validity left than this.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Used when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// A pre-issued long-lived token or API key.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_valid_token(&self) -> Result<String, BridgeError> {
        if self.token.is_empty() {
            return Err(BridgeError::NotConfigured("Kommo token".into()));
        }
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Whether a cached token must be replaced before use at `now`.
fn needs_refresh(cached: Option<&CachedToken>, now: Instant) -> bool {
    match cached {
        None => true,
        Some(t) => t.expires_at.saturating_duration_since(now) < REFRESH_MARGIN,
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth client-credentials provider with an in-memory token cache.
///
/// Concurrent callers that all see a stale token each refresh; the last
/// writer wins. The lock is never held across the HTTP call.
pub struct OAuthTokenProvider {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cache: RwLock<Option<CachedToken>>,
}

impl OAuthTokenProvider {
    /// `base_url` is the account URL, e.g. `https://acme.kommo.com`.
    pub fn new(
        http: Client,
        base_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: format!("{}/oauth2/access_token", base_url.trim_end_matches('/')),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cache: RwLock::new(None),
        }
    }

    /// Seed the cache, e.g. with a token restored from elsewhere.
    pub async fn seed(&self, token: impl Into<String>, valid_for: Duration) {
        *self.cache.write().await = Some(CachedToken {
            token: token.into(),
            expires_at: Instant::now() + valid_for,
        });
    }

    async fn fetch(&self) -> Result<CachedToken, BridgeError> {
        let body = TokenRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            grant_type: "client_credentials",
        };
        let res = self
            .http
            .post(&self.token_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = truncate_for_log(&res.text().await.unwrap_or_default());
            error!(status = status.as_u16(), body = %body, "[Kommo] Token request failed");
            return Err(BridgeError::Http {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = res.json().await.map_err(|e| BridgeError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })?;
        let ttl = parsed
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        info!(expires_in_secs = ttl.as_secs(), "[Kommo] Obtained OAuth access token");
        Ok(CachedToken {
            token: parsed.access_token,
            expires_at: Instant::now() + ttl,
        })
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn get_valid_token(&self) -> Result<String, BridgeError> {
        {
            let cached = self.cache.read().await;
            if !needs_refresh(cached.as_ref(), Instant::now()) {
                if let Some(t) = cached.as_ref() {
                    return Ok(t.token.clone());
                }
            }
        }

        debug!("[Kommo] Cached token missing or near expiry; refreshing");
        let fresh = self.fetch().await?;
        let token = fresh.token.clone();
        *self.cache.write().await = Some(fresh);
        Ok(token)
    }
}
