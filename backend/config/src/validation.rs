//! Config validation with user-friendly messages.
//!
//! Missing credentials are warnings: the matching feature is disabled and
//! the process keeps running. Only settings that make the server unusable
//! are errors.

use crate::schema::BridgeConfig;
use thiserror::Error;

/// A config validation finding with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &BridgeConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_server(config, &mut report);
    validate_line(config, &mut report);
    validate_kommo(config, &mut report);
    report
}

fn validate_server(config: &BridgeConfig, report: &mut ValidationReport) {
    if config.server.port == 0 {
        report.error("server.port", "Port 0 is not a valid listening port");
    }
    if config.line.webhook_path == config.kommo.webhook_path {
        report.error(
            "kommo.webhookPath",
            format!(
                "LINE and Kommo webhooks cannot share the path {}",
                config.line.webhook_path
            ),
        );
    }
    for (path, value) in [
        ("line.webhookPath", &config.line.webhook_path),
        ("kommo.webhookPath", &config.kommo.webhook_path),
    ] {
        if value == "/status" {
            report.error(path, "/status is reserved for the health endpoint");
        }
    }
}

fn validate_line(config: &BridgeConfig, report: &mut ValidationReport) {
    if config.line.channel_secret.is_none() {
        report.warn(
            "line.channelSecret",
            "No channel secret configured; webhook signatures will NOT be verified",
        );
    }
    if config.line.channel_access_token.is_none() {
        report.warn(
            "line.channelAccessToken",
            "No channel access token configured; profile lookups and replies are disabled",
        );
    }
}

fn validate_kommo(config: &BridgeConfig, report: &mut ValidationReport) {
    let kommo = &config.kommo;
    if kommo.resolved_base_url().is_none() {
        report.warn(
            "kommo.subdomain",
            "No Kommo subdomain or base URL configured; CRM sync is disabled",
        );
    }
    if kommo.credential().is_none() {
        report.warn(
            "kommo.accessToken",
            "No Kommo access token, API key, or OAuth client configured; CRM sync is disabled",
        );
    }
    if kommo.client_id.is_some() != kommo.client_secret.is_some() {
        report.warn(
            "kommo.clientSecret",
            "OAuth needs both clientId and clientSecret; the lone value is ignored",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_only_warns() {
        let report = validate(&BridgeConfig::default());
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.path == "line.channelSecret"));
        assert!(report.warnings.iter().any(|w| w.path == "kommo.subdomain"));
    }

    #[test]
    fn shared_webhook_path_is_error() {
        let mut cfg = BridgeConfig::default();
        cfg.kommo.webhook_path = cfg.line.webhook_path.clone();
        let report = validate(&cfg);
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].path, "kommo.webhookPath");
    }

    #[test]
    fn fully_configured_has_no_findings() {
        let mut cfg = BridgeConfig::default();
        cfg.line.channel_secret = Some("secret".into());
        cfg.line.channel_access_token = Some("token".into());
        cfg.kommo.subdomain = Some("acme".into());
        cfg.kommo.access_token = Some("tok".into());
        let report = validate(&cfg);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }
}
