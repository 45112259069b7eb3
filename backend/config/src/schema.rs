//! ocrgate runtime configuration schema.
//!
//! Every field is optional so a partial YAML file (or none at all) is valid;
//! `defaults::apply_all_defaults` fills in the rest.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_ATTEMPT_TIMEOUT_SECS, DEFAULT_BIND, DEFAULT_DEADLINE_SECS, DEFAULT_HEARTBEAT_SECS,
    DEFAULT_LOG_LEVEL, DEFAULT_MAX_POLLS, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_SECS,
};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrGateConfig {
    /// HTTP front end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    /// Local inference backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendConfig>,

    /// Strategy dispatch timing and ordering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchConfig>,

    /// Remote conversion jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<JobsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

impl OcrGateConfig {
    pub fn gateway(&self) -> GatewayConfig {
        self.gateway.clone().unwrap_or_default()
    }

    pub fn backend(&self) -> BackendConfig {
        self.backend.clone().unwrap_or_default()
    }

    pub fn dispatch(&self) -> DispatchConfig {
        self.dispatch.clone().unwrap_or_default()
    }

    pub fn jobs(&self) -> JobsConfig {
        self.jobs.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Where uploads are staged while a request is in flight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_upload_bytes: Option<usize>,
}

impl GatewayConfig {
    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// `command` | `openai` | `ollama` | `mock`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandConfig>,

    /// Canned text returned by the `mock` backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_response: Option<String>,
}

/// Argument templates for a local OCR executable.
///
/// `{path}` and `{prompt}` are replaced per call. A shape with no template is
/// not offered by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandConfig {
    pub program: String,

    /// Batch call: JSON `[{"path":…,"prompt":…}]` on stdin, JSON array out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_args: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_args: Option<Vec<String>>,

    /// Image bytes on stdin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_args: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_args: Option<Vec<String>>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_secs: Option<u64>,

    /// Calling-shape priority, e.g. `[batch_item, image_with_prompt, …]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_order: Option<Vec<String>>,

    /// `detach` (default) | `abort`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_timeout: Option<String>,

    /// Case-insensitive regexes for transient backend errors; replaces the built-in list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient_patterns: Option<Vec<String>>,
}

impl DispatchConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.unwrap_or(DEFAULT_ATTEMPT_TIMEOUT_SECS))
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs.unwrap_or(DEFAULT_DEADLINE_SECS))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.unwrap_or(DEFAULT_HEARTBEAT_SECS))
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_polls: Option<u32>,

    /// Bound on each submission and status-check request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl JobsConfig {
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_secs
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS))
    }

    pub fn max_polls(&self) -> u32 {
        self.max_polls.unwrap_or(DEFAULT_MAX_POLLS)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Directory for the rolling NDJSON log; console only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_parses() {
        let yaml = r#"
backend:
  kind: command
  command:
    program: chandra
    pathArgs: ["{path}", "--method", "hf"]
dispatch:
  attemptTimeoutSecs: 30
  strategyOrder: [path_only, image_only]
"#;
        let cfg: OcrGateConfig = serde_yaml::from_str(yaml).unwrap();
        let backend = cfg.backend();
        assert_eq!(backend.kind.as_deref(), Some("command"));
        let command = backend.command.unwrap();
        assert_eq!(command.program, "chandra");
        assert!(command.batch_args.is_none());
        assert_eq!(cfg.dispatch().attempt_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.dispatch().deadline(), Duration::from_secs(DEFAULT_DEADLINE_SECS));
        assert!(cfg.gateway.is_none());
    }

    #[test]
    fn accessors_fall_back_to_defaults() {
        let cfg = OcrGateConfig::default();
        assert_eq!(cfg.gateway().port(), 5000);
        assert_eq!(cfg.gateway().bind(), "0.0.0.0");
        assert_eq!(cfg.jobs().poll_interval(), Duration::from_secs(2));
        assert_eq!(cfg.jobs().max_polls(), 300);
        assert_eq!(cfg.jobs().request_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.logging().level(), "info");
    }
}
