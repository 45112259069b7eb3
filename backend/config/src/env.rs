//! Environment handling for config values.
//!
//! Two passes run at load time:
//! - `${VAR_NAME}` substitution inside string values of the YAML file. Only
//!   uppercase `[A-Z_][A-Z0-9_]*` names are matched; `$${VAR}` escapes to a
//!   literal `${VAR}`.
//! - `OCRGATE_*` overrides applied on top of the parsed file.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::schema::{CommandConfig, OcrGateConfig};

/// Matches `${VAR}` and its escaped form `$${VAR}`.
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

/// Error returned for missing env vars.
#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references in a config value tree from the process env.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    resolve_env_vars_with(value, &std::env::vars().collect())
}

/// Substitute env vars using a provided map (useful for testing).
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() { k.clone() } else { format!("{path}.{k}") };
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
    let substituted = ENV_VAR_PATTERN.replace_all(s, |caps: &Captures| {
        let var_name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{var_name}}}");
        }
        match env.get(var_name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: var_name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    if let Some(err) = missing {
        bail!(err);
    }
    Ok(substituted.into_owned())
}

/// Apply `OCRGATE_*` (and `DATALAB_*`) overrides from the process environment.
pub fn apply_env_overrides(config: OcrGateConfig) -> Result<OcrGateConfig> {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply overrides from a provided map (useful for testing).
pub fn apply_env_overrides_with(
    mut config: OcrGateConfig,
    env: &HashMap<String, String>,
) -> Result<OcrGateConfig> {
    let get = |name: &str| env.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

    let gateway = config.gateway.get_or_insert_with(Default::default);
    if let Some(bind) = get("OCRGATE_BIND") {
        gateway.bind = Some(bind.to_string());
    }
    if let Some(port) = get("OCRGATE_PORT") {
        gateway.port = Some(parse_var("OCRGATE_PORT", port)?);
    }
    if let Some(dir) = get("OCRGATE_UPLOAD_DIR") {
        gateway.upload_dir = Some(PathBuf::from(dir));
    }

    let backend = config.backend.get_or_insert_with(Default::default);
    if let Some(kind) = get("OCRGATE_BACKEND") {
        backend.kind = Some(kind.to_lowercase());
    }
    if let Some(url) = get("OCRGATE_BACKEND_URL") {
        backend.url = Some(url.to_string());
    }
    if let Some(model) = get("OCRGATE_BACKEND_MODEL") {
        backend.model = Some(model.to_string());
    }
    if let Some(key) = get("OCRGATE_BACKEND_API_KEY") {
        backend.api_key = Some(key.to_string());
    }
    if let Some(program) = get("OCRGATE_COMMAND") {
        let command = backend.command.get_or_insert_with(|| CommandConfig {
            path_args: Some(vec!["{path}".to_string()]),
            ..Default::default()
        });
        command.program = program.to_string();
    }

    let dispatch = config.dispatch.get_or_insert_with(Default::default);
    if let Some(secs) = get("OCRGATE_ATTEMPT_TIMEOUT_SECS") {
        dispatch.attempt_timeout_secs = Some(parse_var("OCRGATE_ATTEMPT_TIMEOUT_SECS", secs)?);
    }
    if let Some(secs) = get("OCRGATE_DEADLINE_SECS") {
        dispatch.deadline_secs = Some(parse_var("OCRGATE_DEADLINE_SECS", secs)?);
    }

    let jobs = config.jobs.get_or_insert_with(Default::default);
    if let Some(key) = get("DATALAB_API_KEY") {
        jobs.api_key = Some(key.to_string());
    }
    if let Some(url) = get("DATALAB_API_URL") {
        jobs.api_url = Some(url.to_string());
    }

    if let Some(dir) = get("OCRGATE_LOG_DIR") {
        config.logging.get_or_insert_with(Default::default).dir = Some(PathBuf::from(dir));
    }

    Ok(config)
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("{name}={raw} is not a valid value"))
}
