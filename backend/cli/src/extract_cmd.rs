//! `ocrgate extract`: one dispatch against the configured backend.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::info;

use ocrgate_backends::{RequestOverrides, Runtime};
use ocrgate_config::OcrGateConfig;
use ocrgate_core::ImagePayload;

use crate::terminal_output::note_error;

/// Prints the extracted text on stdout. On failure the diagnostic report goes
/// to stderr and the process exits non-zero.
pub async fn run(
    config: OcrGateConfig,
    image: &Path,
    instruction: Option<String>,
    attempt_timeout: Option<f64>,
    deadline: Option<f64>,
) -> Result<()> {
    let overrides = RequestOverrides {
        attempt_timeout: attempt_timeout.map(|s| seconds("--attempt-timeout", s)).transpose()?,
        deadline: deadline.map(|s| seconds("--deadline", s)).transpose()?,
    };

    let runtime = Runtime::from_config(config)?;
    let payload = ImagePayload::load(image).await?;
    let request = runtime.request(payload, instruction, overrides);

    match runtime.extract(&request).await {
        Ok(success) => {
            info!(
                backend = %runtime.capability().name(),
                strategy = %success.strategy,
                attempts = success.attempts,
                elapsed_ms = success.elapsed.as_millis() as u64,
                "Extraction succeeded"
            );
            println!("{}", success.text);
            Ok(())
        }
        Err(report) => {
            note_error(&report.summary());
            eprintln!("{}", serde_json::to_string_pretty(&report)?);
            Err(report.to_error().into())
        }
    }
}

fn seconds(flag: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{flag} must be a positive number of seconds, got {value}");
    }
    Ok(Duration::try_from_secs_f64(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_accepts_fractions() {
        assert_eq!(seconds("--deadline", 1.5).unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn seconds_rejects_non_positive() {
        assert!(seconds("--deadline", 0.0).is_err());
        assert!(seconds("--attempt-timeout", -2.0).is_err());
        assert!(seconds("--deadline", f64::NAN).is_err());
    }
}
