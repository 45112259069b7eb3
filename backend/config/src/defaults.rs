//! Config defaults: applies sensible default values to parsed config.

use crate::schema::{CommandConfig, DispatchConfig, GatewayConfig, JobsConfig, OcrGateConfig};

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

/// 32 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

pub const DEFAULT_BACKEND_KIND: &str = "command";
pub const DEFAULT_COMMAND_PROGRAM: &str = "chandra";

pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_DEADLINE_SECS: u64 = 1800;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 60;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_MAX_POLLS: u32 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_OUTPUT_FORMAT: &str = "markdown";
pub const DEFAULT_MODE: &str = "balanced";
pub const DEFAULT_JOBS_API_URL: &str = "https://www.datalab.to/api/v1/marker";

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2-vision";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: OcrGateConfig) -> OcrGateConfig {
    let config = apply_gateway_defaults(config);
    let config = apply_backend_defaults(config);
    let config = apply_dispatch_defaults(config);
    apply_jobs_defaults(config)
}

fn apply_gateway_defaults(mut config: OcrGateConfig) -> OcrGateConfig {
    let gateway = config.gateway.get_or_insert_with(GatewayConfig::default);
    gateway.bind.get_or_insert_with(|| DEFAULT_BIND.to_string());
    gateway.port.get_or_insert(DEFAULT_PORT);
    gateway.max_upload_bytes.get_or_insert(DEFAULT_MAX_UPLOAD_BYTES);
    config
}

/// Fill the URL and model the chosen backend kind needs.
fn apply_backend_defaults(mut config: OcrGateConfig) -> OcrGateConfig {
    let backend = config.backend.get_or_insert_with(Default::default);
    let kind = backend
        .kind
        .get_or_insert_with(|| DEFAULT_BACKEND_KIND.to_string())
        .clone();
    match kind.as_str() {
        "command" => {
            backend.command.get_or_insert_with(|| CommandConfig {
                program: DEFAULT_COMMAND_PROGRAM.to_string(),
                path_args: Some(vec!["{path}".to_string()]),
                ..Default::default()
            });
        }
        "openai" => {
            backend.url.get_or_insert_with(|| DEFAULT_OPENAI_URL.to_string());
            backend.model.get_or_insert_with(|| DEFAULT_OPENAI_MODEL.to_string());
        }
        "ollama" => {
            backend.url.get_or_insert_with(|| DEFAULT_OLLAMA_URL.to_string());
            backend.model.get_or_insert_with(|| DEFAULT_OLLAMA_MODEL.to_string());
        }
        _ => {}
    }
    config
}

fn apply_dispatch_defaults(mut config: OcrGateConfig) -> OcrGateConfig {
    let dispatch = config.dispatch.get_or_insert_with(DispatchConfig::default);
    dispatch.attempt_timeout_secs.get_or_insert(DEFAULT_ATTEMPT_TIMEOUT_SECS);
    dispatch.deadline_secs.get_or_insert(DEFAULT_DEADLINE_SECS);
    dispatch.heartbeat_secs.get_or_insert(DEFAULT_HEARTBEAT_SECS);
    dispatch.on_timeout.get_or_insert_with(|| "detach".to_string());
    config
}

fn apply_jobs_defaults(mut config: OcrGateConfig) -> OcrGateConfig {
    let jobs = config.jobs.get_or_insert_with(JobsConfig::default);
    jobs.api_url.get_or_insert_with(|| DEFAULT_JOBS_API_URL.to_string());
    jobs.poll_interval_secs.get_or_insert(DEFAULT_POLL_INTERVAL_SECS as f64);
    jobs.max_polls.get_or_insert(DEFAULT_MAX_POLLS);
    jobs.request_timeout_secs.get_or_insert(DEFAULT_REQUEST_TIMEOUT_SECS as f64);
    jobs.output_format.get_or_insert_with(|| DEFAULT_OUTPUT_FORMAT.to_string());
    jobs.mode.get_or_insert_with(|| DEFAULT_MODE.to_string());
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BackendConfig;

    #[test]
    fn fills_every_section() {
        let cfg = apply_all_defaults(OcrGateConfig::default());
        assert_eq!(cfg.gateway.unwrap().port, Some(DEFAULT_PORT));
        let backend = cfg.backend.unwrap();
        assert_eq!(backend.kind.as_deref(), Some("command"));
        assert_eq!(backend.command.unwrap().program, DEFAULT_COMMAND_PROGRAM);
        assert_eq!(cfg.dispatch.unwrap().deadline_secs, Some(1800));
        let jobs = cfg.jobs.unwrap();
        assert_eq!(jobs.mode.as_deref(), Some("balanced"));
        assert_eq!(jobs.api_url.as_deref(), Some(DEFAULT_JOBS_API_URL));
    }

    #[test]
    fn backend_defaults_follow_kind() {
        let mut cfg = OcrGateConfig::default();
        cfg.backend = Some(BackendConfig {
            kind: Some("ollama".into()),
            model: Some("llava".into()),
            ..Default::default()
        });
        let backend = apply_all_defaults(cfg).backend.unwrap();
        assert_eq!(backend.url.as_deref(), Some(DEFAULT_OLLAMA_URL));
        assert_eq!(backend.model.as_deref(), Some("llava"));
    }

    #[test]
    fn does_not_override_user_values() {
        let mut cfg = OcrGateConfig::default();
        cfg.dispatch = Some(DispatchConfig {
            attempt_timeout_secs: Some(5),
            ..Default::default()
        });
        let dispatch = apply_all_defaults(cfg).dispatch.unwrap();
        assert_eq!(dispatch.attempt_timeout_secs, Some(5));
        assert_eq!(dispatch.heartbeat_secs, Some(DEFAULT_HEARTBEAT_SECS));
    }
}
