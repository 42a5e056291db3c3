//! Config defaults and normalization applied after loading.

use crate::schema::BridgeConfig;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LINE_WEBHOOK_PATH: &str = "/line/webhook";
pub const DEFAULT_KOMMO_WEBHOOK_PATH: &str = "/kommo/webhook";
pub const DEFAULT_LINE_API_BASE_URL: &str = "https://api.line.me";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default outbound HTTP timeout (seconds).
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const MIN_HTTP_TIMEOUT_SECS: u64 = 5;
pub const MAX_HTTP_TIMEOUT_SECS: u64 = 15;

/// Lead names derived from message text are cut to this many characters.
pub const DEFAULT_LEAD_NAME_MAX_CHARS: usize = 200;

pub const DEFAULT_DEDUPE_WINDOW_SECS: u64 = 300;

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: BridgeConfig) -> BridgeConfig {
    let config = apply_credential_defaults(config);
    let config = apply_path_defaults(config);
    let config = apply_relay_defaults(config);
    apply_logging_defaults(config)
}

fn blank_to_none(value: &mut Option<String>) {
    if let Some(v) = value {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            *value = None;
        } else if trimmed.len() != v.len() {
            *value = Some(trimmed.to_string());
        }
    }
}

/// Empty strings in credential slots mean "not configured".
fn apply_credential_defaults(mut config: BridgeConfig) -> BridgeConfig {
    blank_to_none(&mut config.line.channel_secret);
    blank_to_none(&mut config.line.channel_access_token);
    blank_to_none(&mut config.kommo.subdomain);
    blank_to_none(&mut config.kommo.base_url);
    blank_to_none(&mut config.kommo.api_key);
    blank_to_none(&mut config.kommo.access_token);
    blank_to_none(&mut config.kommo.client_id);
    blank_to_none(&mut config.kommo.client_secret);
    blank_to_none(&mut config.logging.dir);
    config
}

fn normalize_path(path: &mut String, fallback: &str) {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        *path = fallback.to_string();
    } else if !trimmed.starts_with('/') {
        *path = format!("/{trimmed}");
    } else {
        *path = trimmed.to_string();
    }
}

fn apply_path_defaults(mut config: BridgeConfig) -> BridgeConfig {
    normalize_path(&mut config.line.webhook_path, DEFAULT_LINE_WEBHOOK_PATH);
    normalize_path(&mut config.kommo.webhook_path, DEFAULT_KOMMO_WEBHOOK_PATH);
    if config.line.api_base_url.trim().is_empty() {
        config.line.api_base_url = DEFAULT_LINE_API_BASE_URL.to_string();
    }
    config.line.api_base_url = config.line.api_base_url.trim_end_matches('/').to_string();
    if config.server.bind.trim().is_empty() {
        config.server.bind = DEFAULT_BIND.to_string();
    }
    config
}

fn apply_relay_defaults(mut config: BridgeConfig) -> BridgeConfig {
    config.relay.http_timeout_secs = config
        .relay
        .http_timeout_secs
        .clamp(MIN_HTTP_TIMEOUT_SECS, MAX_HTTP_TIMEOUT_SECS);
    if config.relay.lead_name_max_chars == 0 {
        config.relay.lead_name_max_chars = DEFAULT_LEAD_NAME_MAX_CHARS;
    }
    config
}

fn apply_logging_defaults(mut config: BridgeConfig) -> BridgeConfig {
    if config.logging.level.trim().is_empty() {
        config.logging.level = DEFAULT_LOG_LEVEL.to_string();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_credentials_become_none() {
        let mut cfg = BridgeConfig::default();
        cfg.line.channel_secret = Some("  ".into());
        cfg.kommo.api_key = Some(" key ".into());
        let cfg = apply_all_defaults(cfg);
        assert!(cfg.line.channel_secret.is_none());
        assert_eq!(cfg.kommo.api_key.as_deref(), Some("key"));
    }

    #[test]
    fn timeout_is_clamped() {
        let mut cfg = BridgeConfig::default();
        cfg.relay.http_timeout_secs = 60;
        assert_eq!(apply_all_defaults(cfg.clone()).relay.http_timeout_secs, 15);
        cfg.relay.http_timeout_secs = 1;
        assert_eq!(apply_all_defaults(cfg).relay.http_timeout_secs, 5);
    }

    #[test]
    fn paths_get_leading_slash() {
        let mut cfg = BridgeConfig::default();
        cfg.line.webhook_path = "hooks/line".into();
        cfg.kommo.webhook_path = String::new();
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.line.webhook_path, "/hooks/line");
        assert_eq!(cfg.kommo.webhook_path, DEFAULT_KOMMO_WEBHOOK_PATH);
    }
}
