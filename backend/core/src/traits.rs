use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::InvokeError;
use crate::payload::ImagePayload;
use crate::types::{CallingShape, PromptedImage};

/// An inference backend that turns an image into text.
///
/// Each method is one calling shape. Backends implement the shapes they
/// understand and leave the rest at the `Unsupported` default; the dispatch
/// engine discovers which one works by trying them in order.
#[async_trait]
pub trait InferenceCapability: Send + Sync + 'static {
    /// Human-readable backend name (e.g., "ollama", "command").
    fn name(&self) -> &str;

    /// Shapes this backend is willing to be called with.
    ///
    /// Defaults to every known shape, for backends whose convention is not
    /// known in advance.
    fn shapes(&self) -> Vec<CallingShape> {
        CallingShape::ALL.to_vec()
    }

    async fn infer_batch(&self, _items: Vec<PromptedImage>) -> Result<Vec<String>, InvokeError> {
        Err(InvokeError::Unsupported(CallingShape::BatchItem))
    }

    async fn infer_prompted(
        &self,
        _image: &ImagePayload,
        _instruction: &str,
    ) -> Result<String, InvokeError> {
        Err(InvokeError::Unsupported(CallingShape::ImageWithPrompt))
    }

    async fn infer_image(&self, _image: &ImagePayload) -> Result<String, InvokeError> {
        Err(InvokeError::Unsupported(CallingShape::ImageOnly))
    }

    async fn infer_path(&self, _path: &Path) -> Result<String, InvokeError> {
        Err(InvokeError::Unsupported(CallingShape::PathOnly))
    }
}

/// Shared, read-only reference to a resolved backend.
#[derive(Clone)]
pub struct CapabilityHandle(Arc<dyn InferenceCapability>);

impl CapabilityHandle {
    pub fn new(capability: impl InferenceCapability) -> Self {
        Self(Arc::new(capability))
    }
}

impl Deref for CapabilityHandle {
    type Target = dyn InferenceCapability;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityHandle")
            .field("name", &self.0.name())
            .field("shapes", &self.0.shapes())
            .finish()
    }
}
