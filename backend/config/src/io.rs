//! Config file location and loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolve the ocrgate config directory.
/// Priority: `OCRGATE_CONFIG_DIR` env > `~/.ocrgate/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("OCRGATE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".ocrgate"),
        None => PathBuf::from(".ocrgate"),
    }
}

/// Resolve the full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Pick the config file: explicit flag > `OCRGATE_CONFIG` > default location.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("OCRGATE_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    config_file_path(&config_dir())
}

/// Read the YAML file as an untyped tree, ready for env substitution.
///
/// Returns an empty object if the file doesn't exist (first run). An explicitly
/// requested file that is missing is an error.
pub async fn load_raw_config(path: &Path, required: bool) -> Result<Value> {
    if !path.exists() {
        if required {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    let value: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    // A document holding only comments parses to null.
    Ok(if value.is_null() { Value::Object(Default::default()) } else { value })
}
