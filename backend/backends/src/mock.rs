use std::path::Path;

use async_trait::async_trait;

use ocrgate_core::{ImagePayload, InferenceCapability, InvokeError, PromptedImage};

/// A backend that returns canned text, for smoke tests and demos.
pub struct MockCapability {
    fixed_response: Option<String>,
}

impl MockCapability {
    pub fn new() -> Self {
        Self { fixed_response: None }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.fixed_response = Some(response.into());
        self
    }

    fn respond(&self, file_name: &str) -> String {
        self.fixed_response
            .clone()
            .unwrap_or_else(|| format!("Mock text for {file_name}"))
    }
}

impl Default for MockCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceCapability for MockCapability {
    fn name(&self) -> &str {
        "mock"
    }

    async fn infer_batch(&self, items: Vec<PromptedImage>) -> Result<Vec<String>, InvokeError> {
        Ok(items.iter().map(|item| self.respond(&item.image.file_name)).collect())
    }

    async fn infer_prompted(&self, image: &ImagePayload, _instruction: &str) -> Result<String, InvokeError> {
        Ok(self.respond(&image.file_name))
    }

    async fn infer_image(&self, image: &ImagePayload) -> Result<String, InvokeError> {
        Ok(self.respond(&image.file_name))
    }

    async fn infer_path(&self, path: &Path) -> Result<String, InvokeError> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("upload");
        Ok(self.respond(name))
    }
}
