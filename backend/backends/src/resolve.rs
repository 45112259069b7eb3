//! Startup wiring: turn configuration into a backend and a supervisor.
//!
//! Runs once; everything it produces is shared read-only across requests.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use ocrgate_config::{BackendConfig, DispatchConfig, JobsConfig, OcrGateConfig};
use ocrgate_core::{CallingShape, CapabilityHandle, ImagePayload, OcrError};
use ocrgate_dispatch::{
    BoundedAttempt, DispatchSuccess, DispatchSupervisor, FailureReport, InvocationRequest,
    OnTimeout, StrategyCatalog, TransientSignatures,
};
use ocrgate_jobs::{HttpJobTransport, JobOptions, JobPoller, PollPolicy, DEFAULT_API_URL};

use crate::command::CommandCapability;
use crate::mock::MockCapability;
use crate::vision::{OllamaVision, OpenAiVision};

/// Build the configured backend, checking what can be checked before serving.
pub fn resolve_capability(config: &BackendConfig) -> Result<CapabilityHandle, OcrError> {
    let kind = config.kind.as_deref().unwrap_or("command");
    let handle = match kind {
        "command" => {
            let command = config
                .command
                .as_ref()
                .ok_or_else(|| OcrError::Config("backend.command is not configured".into()))?;
            CapabilityHandle::new(CommandCapability::new(command)?)
        }
        "openai" => {
            let api_key = config
                .api_key
                .as_deref()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| OcrError::Config("the openai backend requires backend.apiKey".into()))?;
            let url = required(&config.url, "backend.url")?;
            let model = required(&config.model, "backend.model")?;
            let mut vision = OpenAiVision::new(url, api_key, model);
            if let Some(max_tokens) = config.max_tokens {
                vision = vision.with_max_tokens(max_tokens);
            }
            CapabilityHandle::new(vision)
        }
        "ollama" => {
            let url = required(&config.url, "backend.url")?;
            let model = required(&config.model, "backend.model")?;
            CapabilityHandle::new(OllamaVision::new(url, model))
        }
        "mock" => {
            let mut mock = MockCapability::new();
            if let Some(response) = &config.mock_response {
                mock = mock.with_response(response.clone());
            }
            CapabilityHandle::new(mock)
        }
        other => return Err(OcrError::Config(format!("unknown backend kind `{other}`"))),
    };
    info!(backend = %handle.name(), shapes = ?handle.shapes(), "Resolved inference backend");
    Ok(handle)
}

fn required<'a>(value: &'a Option<String>, path: &str) -> Result<&'a str, OcrError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| OcrError::Config(format!("{path} is not configured")))
}

/// Parse the configured strategy priority, dropping names we do not know.
pub fn strategy_order(config: &DispatchConfig) -> Vec<CallingShape> {
    match &config.strategy_order {
        Some(names) => names
            .iter()
            .filter_map(|name| match name.parse::<CallingShape>() {
                Ok(shape) => Some(shape),
                Err(e) => {
                    warn!(error = %e, "Ignoring strategy in dispatch.strategyOrder");
                    None
                }
            })
            .collect(),
        None => CallingShape::ALL.to_vec(),
    }
}

/// Build the catalog and supervisor for one backend.
pub fn build_supervisor(
    config: &DispatchConfig,
    capability: &CapabilityHandle,
) -> Result<DispatchSupervisor, OcrError> {
    let catalog = StrategyCatalog::build_with_order(capability, &strategy_order(config));

    let on_timeout = match config.on_timeout.as_deref().unwrap_or("detach") {
        "detach" => OnTimeout::Detach,
        "abort" => OnTimeout::Abort,
        other => return Err(OcrError::Config(format!("unknown dispatch.onTimeout `{other}`"))),
    };
    let attempt = BoundedAttempt::new()
        .with_heartbeat_interval(config.heartbeat_interval())
        .on_timeout(on_timeout);

    let mut supervisor = DispatchSupervisor::new(Arc::new(catalog)).with_attempt_runner(attempt);
    if let Some(patterns) = &config.transient_patterns {
        let signatures = TransientSignatures::from_patterns(patterns.as_slice())
            .map_err(|e| OcrError::Config(format!("invalid dispatch.transientPatterns: {e}")))?;
        supervisor = supervisor.with_transient_signatures(signatures);
    }
    info!(
        backend = %capability.name(),
        strategies = ?supervisor.catalog().names(),
        "Strategy catalog built"
    );
    Ok(supervisor)
}

/// Per-request timing overrides supplied by a caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOverrides {
    pub attempt_timeout: Option<Duration>,
    pub deadline: Option<Duration>,
}

/// The resolved, immutable service state shared by every request.
#[derive(Clone)]
pub struct Runtime {
    config: Arc<OcrGateConfig>,
    capability: CapabilityHandle,
    supervisor: DispatchSupervisor,
}

impl Runtime {
    pub fn from_config(config: OcrGateConfig) -> Result<Self, OcrError> {
        let capability = resolve_capability(&config.backend())?;
        Self::with_capability(config, capability)
    }

    /// Wire an already-built backend into the configured dispatch policy.
    pub fn with_capability(config: OcrGateConfig, capability: CapabilityHandle) -> Result<Self, OcrError> {
        let supervisor = build_supervisor(&config.dispatch(), &capability)?;
        Ok(Self { config: Arc::new(config), capability, supervisor })
    }

    pub fn config(&self) -> &OcrGateConfig {
        &self.config
    }

    pub fn capability(&self) -> &CapabilityHandle {
        &self.capability
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        self.supervisor.catalog()
    }

    /// Build a request with the configured timing, then apply caller overrides.
    pub fn request(
        &self,
        payload: ImagePayload,
        instruction: Option<String>,
        overrides: RequestOverrides,
    ) -> InvocationRequest {
        let dispatch = self.config.dispatch();
        InvocationRequest::new(payload, instruction.unwrap_or_default())
            .with_attempt_timeout(overrides.attempt_timeout.unwrap_or_else(|| dispatch.attempt_timeout()))
            .with_deadline(overrides.deadline.unwrap_or_else(|| dispatch.deadline()))
    }

    pub async fn extract(&self, request: &InvocationRequest) -> Result<DispatchSuccess, FailureReport> {
        self.supervisor.dispatch(&self.capability, request).await
    }

    /// Build a remote-job client. A missing API key fails here, before any request.
    pub fn job_poller(&self) -> Result<JobPoller<HttpJobTransport>, OcrError> {
        job_poller(&self.config.jobs())
    }

    pub fn job_options(&self, output_format: Option<String>, mode: Option<String>) -> JobOptions {
        let jobs = self.config.jobs();
        let defaults = JobOptions::default();
        JobOptions {
            output_format: output_format
                .or(jobs.output_format)
                .unwrap_or(defaults.output_format),
            mode: mode.or(jobs.mode).unwrap_or(defaults.mode),
            extra: defaults.extra,
        }
    }
}

pub fn job_poller(config: &JobsConfig) -> Result<JobPoller<HttpJobTransport>, OcrError> {
    let api_url = config.api_url.clone().unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let transport = HttpJobTransport::new(api_url, config.api_key.clone().unwrap_or_default())?
        .with_request_timeout(config.request_timeout());
    Ok(JobPoller::new(transport).with_policy(PollPolicy {
        interval: config.poll_interval(),
        max_polls: config.max_polls(),
        check_timeout: config.request_timeout(),
    }))
}
