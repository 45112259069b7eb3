//! `ocrgate status`: ask a running gateway how it is doing.

use anyhow::Result;

use ocrgate_config::OcrGateConfig;

use crate::terminal_output::note_error;

pub async fn run(config: &OcrGateConfig) -> Result<()> {
    let url = health_url(config);
    let client = reqwest::Client::new();
    match client.get(&url).send().await {
        Ok(resp) => {
            let body: serde_json::Value = resp.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Err(e) => {
            note_error(&format!("ocrgate is not reachable at {url}"));
            Err(e.into())
        }
    }
}

/// A wildcard bind address is reached over loopback.
fn health_url(config: &OcrGateConfig) -> String {
    let gateway = config.gateway();
    let host = match gateway.bind() {
        "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        other => other,
    };
    format!("http://{host}:{}/api/health", gateway.port())
}
