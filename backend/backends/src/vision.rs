//! Vision LLM backends: read an image by asking a multimodal model.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use ocrgate_core::{CallingShape, ImagePayload, InferenceCapability, InvokeError, DEFAULT_INSTRUCTION};
use ocrgate_logging::redact_sensitive_data;

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Turn a transport failure into backend error text, source chain included.
fn transport_error(context: &str, error: reqwest::Error) -> InvokeError {
    let error = anyhow::Error::new(error).context(context.to_string());
    InvokeError::Backend(redact_sensitive_data(&format!("{error:#}")))
}

async fn status_error(provider: &str, response: reqwest::Response) -> InvokeError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    InvokeError::Backend(redact_sensitive_data(&format!("{provider} returned {status}: {body}")))
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions
// ---------------------------------------------------------------------------

pub struct OpenAiVision {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl OpenAiVision {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn describe(&self, image: &ImagePayload, prompt: &str) -> Result<String, InvokeError> {
        debug!(model = %self.model, file = %image.file_name, "Reading image via OpenAI-compatible API");
        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image.data_uri() } }
                ]
            }],
            "max_tokens": self.max_tokens
        });
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("OpenAI request failed", e))?;
        if !response.status().is_success() {
            return Err(status_error("OpenAI", response).await);
        }
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| transport_error("failed to parse OpenAI response", e))?;
        Ok(json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl InferenceCapability for OpenAiVision {
    fn name(&self) -> &str {
        "openai"
    }

    fn shapes(&self) -> Vec<CallingShape> {
        vec![CallingShape::ImageWithPrompt, CallingShape::ImageOnly]
    }

    async fn infer_prompted(&self, image: &ImagePayload, instruction: &str) -> Result<String, InvokeError> {
        self.describe(image, instruction).await
    }

    async fn infer_image(&self, image: &ImagePayload) -> Result<String, InvokeError> {
        self.describe(image, DEFAULT_INSTRUCTION).await
    }
}

// ---------------------------------------------------------------------------
// Ollama /api/generate
// ---------------------------------------------------------------------------

pub struct OllamaVision {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaVision {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    async fn generate(&self, image: &ImagePayload, prompt: &str) -> Result<String, InvokeError> {
        debug!(model = %self.model, file = %image.file_name, "Reading image via Ollama");
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            images: vec![image.to_base64()],
            stream: false,
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Ollama request failed", e))?;
        if !response.status().is_success() {
            return Err(status_error("Ollama", response).await);
        }
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| transport_error("failed to parse Ollama response", e))?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl InferenceCapability for OllamaVision {
    fn name(&self) -> &str {
        "ollama"
    }

    fn shapes(&self) -> Vec<CallingShape> {
        vec![CallingShape::ImageWithPrompt, CallingShape::ImageOnly]
    }

    async fn infer_prompted(&self, image: &ImagePayload, instruction: &str) -> Result<String, InvokeError> {
        self.generate(image, instruction).await
    }

    async fn infer_image(&self, image: &ImagePayload) -> Result<String, InvokeError> {
        self.generate(image, DEFAULT_INSTRUCTION).await
    }
}
