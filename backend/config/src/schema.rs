//! Bridge configuration schema.
//!
//! Typed for serde YAML/JSON deserialization. Every section is optional in
//! the file; missing fields take the values from `defaults`.

use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_BIND, DEFAULT_DEDUPE_WINDOW_SECS, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_KOMMO_WEBHOOK_PATH, DEFAULT_LEAD_NAME_MAX_CHARS, DEFAULT_LINE_API_BASE_URL,
    DEFAULT_LINE_WEBHOOK_PATH, DEFAULT_LOG_LEVEL, DEFAULT_PORT,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub line: LineConfig,
    pub kommo: KommoConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

// ---------------------------------------------------------------------------
// LINE
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LineConfig {
    /// HMAC key for `x-line-signature`. Unset disables verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_secret: Option<String>,
    /// Bearer token for profile and push calls. Unset disables replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_access_token: Option<String>,
    pub webhook_path: String,
    pub api_base_url: String,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_secret: None,
            channel_access_token: None,
            webhook_path: DEFAULT_LINE_WEBHOOK_PATH.to_string(),
            api_base_url: DEFAULT_LINE_API_BASE_URL.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Kommo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KommoConfig {
    /// Account subdomain (`acme` for `acme.kommo.com`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    /// Full base URL; overrides the subdomain-derived one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Pipeline for newly created leads; Kommo's default pipeline when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<u64>,
    pub webhook_path: String,
}

impl Default for KommoConfig {
    fn default() -> Self {
        Self {
            subdomain: None,
            base_url: None,
            api_key: None,
            access_token: None,
            client_id: None,
            client_secret: None,
            pipeline_id: None,
            webhook_path: DEFAULT_KOMMO_WEBHOOK_PATH.to_string(),
        }
    }
}

/// How the bridge authenticates against Kommo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrmCredential {
    AccessToken(String),
    ApiKey(String),
    OAuthClientCredentials {
        client_id: String,
        client_secret: String,
    },
}

impl KommoConfig {
    /// Selected credential: access token, then API key, then OAuth client.
    pub fn credential(&self) -> Option<CrmCredential> {
        if let Some(token) = &self.access_token {
            return Some(CrmCredential::AccessToken(token.clone()));
        }
        if let Some(key) = &self.api_key {
            return Some(CrmCredential::ApiKey(key.clone()));
        }
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Some(CrmCredential::OAuthClientCredentials {
                client_id: id.clone(),
                client_secret: secret.clone(),
            }),
            _ => None,
        }
    }

    /// API base URL without trailing slash.
    pub fn resolved_base_url(&self) -> Option<String> {
        if let Some(url) = &self.base_url {
            return Some(url.trim_end_matches('/').to_string());
        }
        let sub = self.subdomain.as_deref()?;
        if sub.contains('.') {
            // Already a host such as `acme.kommo.com`.
            let host = sub.trim_start_matches("https://").trim_start_matches("http://");
            Some(format!("https://{}", host.trim_end_matches('/')))
        } else {
            Some(format!("https://{sub}.kommo.com"))
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.resolved_base_url().is_some() && self.credential().is_some()
    }
}

// ---------------------------------------------------------------------------
// Relay behaviour
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    /// Timeout applied to every outbound HTTP call, clamped to 5..=15.
    pub http_timeout_secs: u64,
    pub lead_name_max_chars: usize,
    /// How long webhook event ids are remembered for redelivery dedupe.
    pub dedupe_window_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            lead_name_max_chars: DEFAULT_LEAD_NAME_MAX_CHARS,
            dedupe_window_secs: DEFAULT_DEDUPE_WINDOW_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// Directory for daily-rotated NDJSON logs. Console only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            json: false,
            dir: None,
        }
    }
}
