//! Builds the concrete LINE and Kommo clients from configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{info, warn};

use linebridge_channels::LineClient;
use linebridge_config::{BridgeConfig, CrmCredential, KommoConfig, LineConfig};
use linebridge_core::{CrmApi, MessagingApi, TokenProvider};
use linebridge_crm::{KommoClient, OAuthTokenProvider, StaticTokenProvider};

/// One HTTP client for all outbound calls, carrying the relay timeout.
pub fn http_client(config: &BridgeConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.relay.http_timeout_secs))
        .user_agent(concat!("linebridge/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

pub fn token_provider(credential: CrmCredential, http: Client, base_url: &str) -> Arc<dyn TokenProvider> {
    match credential {
        CrmCredential::AccessToken(token) => {
            info!("[Kommo] Using long-lived access token");
            Arc::new(StaticTokenProvider::new(token))
        }
        CrmCredential::ApiKey(key) => {
            info!("[Kommo] Using API key");
            Arc::new(StaticTokenProvider::new(key))
        }
        CrmCredential::OAuthClientCredentials {
            client_id,
            client_secret,
        } => {
            info!("[Kommo] Using OAuth client credentials");
            Arc::new(OAuthTokenProvider::new(http, base_url, client_id, client_secret))
        }
    }
}

/// `None` when Kommo is not fully configured; inbound messages are then not synced.
pub fn crm(config: &KommoConfig, http: &Client) -> Option<Arc<dyn CrmApi>> {
    let (Some(base_url), Some(credential)) = (config.resolved_base_url(), config.credential()) else {
        warn!("[Kommo] Not configured; CRM sync disabled");
        return None;
    };
    let tokens = token_provider(credential, http.clone(), &base_url);
    info!(base_url = %base_url, "[Kommo] CRM client ready");
    Some(Arc::new(KommoClient::new(http.clone(), base_url, tokens)))
}

pub fn messaging(config: &LineConfig, http: &Client) -> Arc<dyn MessagingApi> {
    let client = LineClient::new(http.clone(), config.channel_access_token.clone())
        .with_base_url(&config.api_base_url);
    if !client.enabled() {
        warn!("[LINE] No channel access token; replies to LINE disabled");
    }
    Arc::new(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crm_requires_url_and_credential() {
        let http = Client::new();
        let mut kommo = KommoConfig::default();
        assert!(crm(&kommo, &http).is_none());

        kommo.subdomain = Some("acme".into());
        assert!(crm(&kommo, &http).is_none());

        kommo.api_key = Some("key".into());
        assert!(crm(&kommo, &http).is_some());
    }

    #[test]
    fn messaging_enabled_follows_token() {
        let http = Client::new();
        let mut line = LineConfig::default();
        assert!(!messaging(&line, &http).enabled());
        line.channel_access_token = Some("token".into());
        assert!(messaging(&line, &http).enabled());
    }

    #[tokio::test]
    async fn static_credentials_are_served_verbatim() {
        let provider = token_provider(
            CrmCredential::AccessToken("long-lived".into()),
            Client::new(),
            "https://acme.kommo.com",
        );
        assert_eq!(provider.get_valid_token().await.unwrap(), "long-lived");
    }

    #[test]
    fn client_builds_with_configured_timeout() {
        assert!(http_client(&BridgeConfig::default()).is_ok());
    }
}
