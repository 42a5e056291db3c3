//! `linebridge-config`: runtime configuration for the LINE/Kommo bridge.
//!
//! Provides:
//! - Typed config schema (server, LINE, Kommo, relay, logging)
//! - Optional YAML config file with `${ENV_VAR}` substitution
//! - Environment variable overrides
//! - Default value application and normalization
//! - Validation (missing credentials disable features, never abort)
//! - Redaction for safe logging/display

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{apply_env_overrides, process_env, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_raw};
pub use redact::{redact, redacted_snapshot};
pub use schema::{
    BridgeConfig, CrmCredential, KommoConfig, LineConfig, LoggingConfig, RelayConfig,
    ServerConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Turn a raw config tree into a typed, defaulted config.
///
/// Pipeline: `${VAR}` substitution → deserialize → env overrides → defaults.
pub fn prepare(raw: Value, env: &HashMap<String, String>) -> Result<BridgeConfig> {
    let value = resolve_env_vars_with(&raw, env).context("Failed to resolve env vars in config")?;
    let config: BridgeConfig =
        serde_json::from_value(value).context("Failed to deserialize config")?;
    let config = apply_env_overrides(config, env);
    Ok(apply_all_defaults(config))
}

/// Load, substitute, override, and default the config.
///
/// This is the main entry point for loading a config at runtime. The
/// validation report is returned so callers decide how to surface it.
pub async fn load_and_prepare(explicit: Option<&Path>) -> Result<(BridgeConfig, ValidationReport)> {
    let env = process_env();
    let path = config_file_path(explicit, &env);
    let raw = load_raw(&path).await?;
    let config = prepare(raw, &env)?;
    let report = validate(&config);
    Ok((config, report))
}

/// Log every finding of a validation report.
pub fn log_report(report: &ValidationReport) {
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_env_refs_overrides_and_defaults_compose() {
        let raw = io::parse_yaml(
            r#"
server:
  port: 4000
line:
  channelSecret: "${MY_SECRET}"
  webhookPath: "hooks/line"
kommo:
  subdomain: acme
relay:
  httpTimeoutSecs: 30
"#,
        )
        .unwrap();
        let env: HashMap<String, String> = [
            ("MY_SECRET", "abc"),
            ("KOMMO_ACCESS_TOKEN", "tok"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let cfg = prepare(raw, &env).unwrap();
        assert_eq!(cfg.server.port, 4000);
        assert_eq!(cfg.line.channel_secret.as_deref(), Some("abc"));
        assert_eq!(cfg.line.webhook_path, "/hooks/line");
        assert_eq!(cfg.kommo.credential(), Some(CrmCredential::AccessToken("tok".into())));
        assert_eq!(cfg.relay.http_timeout_secs, 15);
        assert!(cfg.kommo.is_enabled());
    }

    #[test]
    fn bad_types_are_reported() {
        let raw = io::parse_yaml("server:\n  port: not-a-number\n").unwrap();
        assert!(prepare(raw, &HashMap::new()).is_err());
    }
}
