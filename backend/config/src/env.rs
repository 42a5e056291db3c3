//! Environment handling for config values.
//!
//! Two passes run at load time:
//! - `${VAR_NAME}` references inside string values of the config file are
//!   substituted (`$${VAR}` escapes to a literal `${VAR}`);
//! - well-known variables such as `LINE_CHANNEL_SECRET` override fields
//!   after the file is parsed.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

use crate::schema::BridgeConfig;

/// `${VAR}` with an optional leading `$` marking an escape.
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

/// Error returned for missing env vars.
#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Snapshot of the process environment.
pub fn process_env() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Substitute `${VAR}` references in a config JSON value tree.
///
/// Only string leaves are processed. A referenced variable that is unset
/// or empty is an error naming the config path.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => {
            let result: Result<Vec<_>> = arr
                .iter()
                .enumerate()
                .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
                .collect();
            Ok(Value::Array(result?))
        }
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let substituted = ENV_VAR_PATTERN.replace_all(s, |caps: &regex::Captures| {
        let var_name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{var_name}}}");
        }
        match env.get(var_name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                if missing.is_none() {
                    missing = Some(MissingEnvVarError {
                        var_name: var_name.to_string(),
                        config_path: path.to_string(),
                    });
                }
                String::new()
            }
        }
    });

    if let Some(err) = missing {
        bail!(err);
    }
    Ok(substituted.into_owned())
}

fn non_empty(env: &HashMap<String, String>, key: &str) -> Option<String> {
    env.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Override config fields from well-known environment variables.
pub fn apply_env_overrides(mut config: BridgeConfig, env: &HashMap<String, String>) -> BridgeConfig {
    if let Some(v) = non_empty(env, "LINEBRIDGE_BIND") {
        config.server.bind = v;
    }
    if let Some(port) = non_empty(env, "PORT").and_then(|p| p.parse().ok()) {
        config.server.port = port;
    }

    if let Some(v) = non_empty(env, "LINE_CHANNEL_SECRET") {
        config.line.channel_secret = Some(v);
    }
    if let Some(v) = non_empty(env, "LINE_CHANNEL_ACCESS_TOKEN") {
        config.line.channel_access_token = Some(v);
    }

    if let Some(v) = non_empty(env, "KOMMO_SUBDOMAIN") {
        config.kommo.subdomain = Some(v);
    }
    if let Some(v) = non_empty(env, "KOMMO_BASE_URL") {
        config.kommo.base_url = Some(v);
    }
    if let Some(v) = non_empty(env, "KOMMO_API_KEY") {
        config.kommo.api_key = Some(v);
    }
    if let Some(v) = non_empty(env, "KOMMO_ACCESS_TOKEN") {
        config.kommo.access_token = Some(v);
    }
    if let Some(v) = non_empty(env, "KOMMO_CLIENT_ID") {
        config.kommo.client_id = Some(v);
    }
    if let Some(v) = non_empty(env, "KOMMO_CLIENT_SECRET") {
        config.kommo.client_secret = Some(v);
    }
    if let Some(id) = non_empty(env, "KOMMO_PIPELINE_ID").and_then(|p| p.parse().ok()) {
        config.kommo.pipeline_id = Some(id);
    }

    if let Some(v) = non_empty(env, "RUST_LOG") {
        config.logging.level = v;
    }
    config
}
