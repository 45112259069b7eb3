//! Scripted backend shared by the dispatch tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use ocrgate_core::{
    CallingShape, CapabilityHandle, ImagePayload, InferenceCapability, InvokeError, PromptedImage,
};

use crate::request::InvocationRequest;

#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Succeed(&'static str),
    Fail(&'static str),
    Delay(Duration, &'static str),
    Hang,
    Panic,
}

pub(crate) struct ScriptedCapability {
    declared: Vec<CallingShape>,
    behaviors: HashMap<CallingShape, Behavior>,
    calls: Arc<Mutex<Vec<CallingShape>>>,
}

impl ScriptedCapability {
    pub(crate) fn new() -> Self {
        Self {
            declared: CallingShape::ALL.to_vec(),
            behaviors: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn declare(mut self, shapes: &[CallingShape]) -> Self {
        self.declared = shapes.to_vec();
        self
    }

    pub(crate) fn on(mut self, shape: CallingShape, behavior: Behavior) -> Self {
        self.behaviors.insert(shape, behavior);
        self
    }

    /// Script every shape with the same behavior.
    pub(crate) fn all(mut self, behavior: Behavior) -> Self {
        for shape in CallingShape::ALL {
            self.behaviors.insert(shape, behavior.clone());
        }
        self
    }

    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<CallingShape>>> {
        Arc::clone(&self.calls)
    }

    pub(crate) fn into_handle(self) -> CapabilityHandle {
        CapabilityHandle::new(self)
    }

    async fn act(&self, shape: CallingShape) -> Result<String, InvokeError> {
        self.calls.lock().unwrap().push(shape);
        let behavior = self.behaviors.get(&shape).cloned();
        match behavior {
            None => Err(InvokeError::Unsupported(shape)),
            Some(Behavior::Succeed(text)) => Ok(text.to_string()),
            Some(Behavior::Fail(detail)) => Err(InvokeError::Backend(detail.to_string())),
            Some(Behavior::Delay(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text.to_string())
            }
            Some(Behavior::Hang) => std::future::pending().await,
            Some(Behavior::Panic) => panic!("scripted panic in {shape}"),
        }
    }
}

#[async_trait]
impl InferenceCapability for ScriptedCapability {
    fn name(&self) -> &str {
        "scripted"
    }

    fn shapes(&self) -> Vec<CallingShape> {
        self.declared.clone()
    }

    async fn infer_batch(&self, items: Vec<PromptedImage>) -> Result<Vec<String>, InvokeError> {
        assert_eq!(items.len(), 1);
        self.act(CallingShape::BatchItem).await.map(|t| vec![t])
    }

    async fn infer_prompted(
        &self,
        _image: &ImagePayload,
        _instruction: &str,
    ) -> Result<String, InvokeError> {
        self.act(CallingShape::ImageWithPrompt).await
    }

    async fn infer_image(&self, _image: &ImagePayload) -> Result<String, InvokeError> {
        self.act(CallingShape::ImageOnly).await
    }

    async fn infer_path(&self, _path: &Path) -> Result<String, InvokeError> {
        self.act(CallingShape::PathOnly).await
    }
}

pub(crate) fn sample_request() -> InvocationRequest {
    let payload = ImagePayload::from_bytes(
        "/tmp/receipt.png",
        Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
    );
    InvocationRequest::new(payload, "read the receipt")
}
