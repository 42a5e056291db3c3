//! Config file discovery and loading.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolve the config directory.
/// Priority: `LINEBRIDGE_CONFIG_DIR` env > `~/.linebridge/` > `./.linebridge`
pub fn config_dir(env: &HashMap<String, String>) -> PathBuf {
    if let Some(dir) = env.get("LINEBRIDGE_CONFIG_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".linebridge"),
        None => PathBuf::from(".linebridge"),
    }
}

/// Resolve the config file path: explicit path > `LINEBRIDGE_CONFIG` > config dir.
pub fn config_file_path(explicit: Option<&Path>, env: &HashMap<String, String>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env.get("LINEBRIDGE_CONFIG").filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    config_dir(env).join(CONFIG_FILE_NAME)
}

/// Parse YAML text into a JSON value tree (an empty document is `{}`).
pub fn parse_yaml(raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_yaml::from_str(raw).context("Failed to parse config YAML")?;
    if value.is_null() {
        return Ok(Value::Object(Default::default()));
    }
    Ok(value)
}

/// Load the raw config tree from disk.
///
/// Returns an empty tree if the file doesn't exist; every setting can then
/// come from the environment.
pub async fn load_raw(path: &Path) -> Result<Value> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "Config file does not exist; using environment and defaults");
        return Ok(Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let value = parse_yaml(&raw)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    info!(path = %path.display(), "Loaded config file");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn explicit_path_wins() {
        let e = env(&[("LINEBRIDGE_CONFIG", "/etc/lb.yaml")]);
        let p = config_file_path(Some(Path::new("/tmp/x.yaml")), &e);
        assert_eq!(p, PathBuf::from("/tmp/x.yaml"));
        assert_eq!(config_file_path(None, &e), PathBuf::from("/etc/lb.yaml"));
    }

    #[test]
    fn config_dir_env_is_used() {
        let e = env(&[("LINEBRIDGE_CONFIG_DIR", "/srv/lb")]);
        assert_eq!(config_file_path(None, &e), PathBuf::from("/srv/lb/config.yaml"));
    }

    #[test]
    fn empty_yaml_is_empty_object() {
        assert_eq!(parse_yaml("").unwrap(), Value::Object(Default::default()));
    }

    #[tokio::test]
    async fn missing_file_loads_empty_tree() {
        let value = load_raw(Path::new("/nonexistent/linebridge/config.yaml"))
            .await
            .unwrap();
        assert!(value.as_object().unwrap().is_empty());
    }
}
