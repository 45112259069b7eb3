//! `ocrgate convert`: submit a document to the remote conversion service and
//! wait for the result.

use std::path::Path;

use anyhow::Result;
use serde_json::Value;
use tracing::info;

use ocrgate_backends::Runtime;
use ocrgate_config::OcrGateConfig;
use ocrgate_core::ImagePayload;

pub async fn run(
    config: OcrGateConfig,
    file: &Path,
    output_format: Option<String>,
    mode: Option<String>,
) -> Result<()> {
    let runtime = Runtime::from_config(config)?;
    let poller = runtime.job_poller()?;
    let options = runtime.job_options(output_format, mode);

    let payload = ImagePayload::load(file).await?;
    info!(file = %payload.file_name, format = %options.output_format, mode = %options.mode, "Submitting conversion");

    let result = poller.run(&payload, &options).await.into_result()?;
    println!("{}", render_result(&result, &options.output_format)?);
    Ok(())
}

/// The field named after the output format when the service returned it as
/// text, otherwise the whole body as pretty JSON.
fn render_result(result: &Value, output_format: &str) -> Result<String> {
    match result.get(output_format) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) if !other.is_null() => Ok(serde_json::to_string_pretty(other)?),
        _ => Ok(serde_json::to_string_pretty(result)?),
    }
}
