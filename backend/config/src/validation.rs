//! Config validation: deep schema checks with user-friendly error messages.

use ocrgate_core::CallingShape;
use regex::RegexBuilder;
use thiserror::Error;

use crate::schema::OcrGateConfig;

/// Backend kinds `resolve_capability` knows how to build.
pub const BACKEND_KINDS: &[&str] = &["command", "openai", "ollama", "mock"];

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
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
        self.errors.push(ConfigValidationError { path: path.into(), message: message.into() });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError { path: path.into(), message: message.into() });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &OcrGateConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_gateway(config, &mut report);
    validate_backend(config, &mut report);
    validate_dispatch(config, &mut report);
    validate_jobs(config, &mut report);
    report
}

fn validate_gateway(config: &OcrGateConfig, report: &mut ValidationReport) {
    let Some(gw) = &config.gateway else { return };
    if let Some(port) = gw.port {
        if port < 1024 && port != 80 && port != 443 {
            report.warn(
                "gateway.port",
                format!("Port {port} requires elevated privileges; consider using a port >= 1024"),
            );
        }
    }
    if gw.max_upload_bytes == Some(0) {
        report.error("gateway.maxUploadBytes", "maxUploadBytes must be > 0");
    }
}

fn validate_backend(config: &OcrGateConfig, report: &mut ValidationReport) {
    let Some(backend) = &config.backend else { return };
    let Some(kind) = backend.kind.as_deref() else { return };
    if !BACKEND_KINDS.contains(&kind) {
        report.error(
            "backend.kind",
            format!("Unknown backend kind '{kind}'. Use one of: {}", BACKEND_KINDS.join(", ")),
        );
        return;
    }
    match kind {
        "command" => match &backend.command {
            Some(cmd) if !cmd.program.trim().is_empty() => {
                let declared = [&cmd.batch_args, &cmd.prompt_args, &cmd.image_args, &cmd.path_args];
                if declared.iter().all(|args| args.is_none()) {
                    report.warn(
                        "backend.command",
                        "No argument templates configured; the catalog will be empty",
                    );
                }
            }
            _ => report.error("backend.command.program", "A command backend needs a program"),
        },
        "openai" if backend.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) => {
            report.error("backend.apiKey", "The openai backend requires an API key");
        }
        _ => {}
    }
}

fn validate_dispatch(config: &OcrGateConfig, report: &mut ValidationReport) {
    let Some(dispatch) = &config.dispatch else { return };
    if dispatch.attempt_timeout_secs == Some(0) {
        report.error("dispatch.attemptTimeoutSecs", "attemptTimeoutSecs must be >= 1");
    }
    if dispatch.deadline_secs == Some(0) {
        report.error("dispatch.deadlineSecs", "deadlineSecs must be >= 1");
    }
    if dispatch.heartbeat_secs == Some(0) {
        report.error("dispatch.heartbeatSecs", "heartbeatSecs must be >= 1");
    }
    if let (Some(attempt), Some(deadline)) = (dispatch.attempt_timeout_secs, dispatch.deadline_secs) {
        if attempt >= deadline && attempt > 0 {
            report.warn(
                "dispatch.attemptTimeoutSecs",
                format!("attemptTimeoutSecs ({attempt}) >= deadlineSecs ({deadline}); only the first strategy can run to its timeout"),
            );
        }
    }
    if let Some(order) = &dispatch.strategy_order {
        for (i, name) in order.iter().enumerate() {
            if name.parse::<CallingShape>().is_err() {
                report.warn(
                    format!("dispatch.strategyOrder[{i}]"),
                    format!("Unknown strategy '{name}' will be ignored"),
                );
            }
        }
    }
    if let Some(mode) = &dispatch.on_timeout {
        if !matches!(mode.as_str(), "detach" | "abort") {
            report.error(
                "dispatch.onTimeout",
                format!("Unknown onTimeout '{mode}'. Use 'detach' or 'abort'"),
            );
        }
    }
    if let Some(patterns) = &dispatch.transient_patterns {
        for (i, pattern) in patterns.iter().enumerate() {
            if let Err(e) = RegexBuilder::new(pattern).case_insensitive(true).build() {
                report.error(format!("dispatch.transientPatterns[{i}]"), e.to_string());
            }
        }
    }
}

fn validate_jobs(config: &OcrGateConfig, report: &mut ValidationReport) {
    let Some(jobs) = &config.jobs else { return };
    if jobs.max_polls == Some(0) {
        report.error("jobs.maxPolls", "maxPolls must be >= 1");
    }
    if let Some(interval) = jobs.poll_interval_secs {
        if !(interval.is_finite() && interval > 0.0) {
            report.error("jobs.pollIntervalSecs", "pollIntervalSecs must be > 0");
        }
    }
    if let Some(timeout) = jobs.request_timeout_secs {
        if !(timeout.is_finite() && timeout > 0.0) {
            report.error("jobs.requestTimeoutSecs", "requestTimeoutSecs must be > 0");
        }
    }
}
