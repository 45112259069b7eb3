//! `ocrgate-config`: runtime configuration.
//!
//! Provides:
//! - Typed config schema (gateway, backend, dispatch, jobs, logging)
//! - YAML loading from `--config`, `OCRGATE_CONFIG`, or `~/.ocrgate/config.yaml`
//! - `${ENV_VAR}` substitution and `OCRGATE_*` overrides
//! - Config redaction for safe display
//! - Default value application
//! - Validation with warnings and errors

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{
    apply_env_overrides, apply_env_overrides_with, resolve_env_vars, resolve_env_vars_with,
    MissingEnvVarError,
};
pub use io::{config_dir, config_file_path, load_raw_config, resolve_config_path};
pub use redact::redact;
pub use schema::{
    BackendConfig, CommandConfig, DispatchConfig, GatewayConfig, JobsConfig, LoggingConfig,
    OcrGateConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport, BACKEND_KINDS};

use std::path::Path;

use anyhow::{bail, Context, Result};

/// A loaded config plus the validation warnings it produced.
///
/// Warnings are held rather than logged so the caller can report them once
/// its subscriber is installed, with the level the config itself asks for.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: OcrGateConfig,
    pub warnings: Vec<ConfigValidationError>,
}

impl LoadedConfig {
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
        }
    }
}

/// Load, substitute env vars, apply overrides and defaults, then validate.
///
/// This is the main entry point for loading a config at runtime. Any
/// validation error fails the load; warnings come back with the config.
pub async fn load_and_prepare(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = resolve_config_path(explicit);
    let raw = load_raw_config(&path, explicit.is_some()).await?;

    let value = resolve_env_vars(&raw).context("Failed to resolve env vars in config")?;
    let config: OcrGateConfig = serde_json::from_value(value)
        .with_context(|| format!("Invalid config at {}", path.display()))?;

    let config = apply_env_overrides(config)?;
    let config = apply_all_defaults(config);
    let warnings = check(&config)?;
    Ok(LoadedConfig { config, warnings })
}

/// Fail on validation errors, listing all of them; hand back the warnings.
pub fn check(config: &OcrGateConfig) -> Result<Vec<ConfigValidationError>> {
    let report = validate(config);
    if !report.is_valid() {
        let errors: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
        bail!("Invalid configuration:\n  {}", errors.join("\n  "));
    }
    Ok(report.warnings)
}
