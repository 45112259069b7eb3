//! Strategy catalog: the ordered calling shapes to try against one backend.
//!
//! Building a catalog only reads the shapes a backend declares. It never
//! calls the backend, so it is safe to build once at startup and share.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use ocrgate_core::{CallingShape, CapabilityHandle, InvokeError, PromptedImage};

use crate::request::InvocationRequest;

/// A ready-to-run backend call for one strategy.
pub type Thunk = BoxFuture<'static, Result<String, InvokeError>>;

/// Turns a request into a thunk for one calling shape.
pub type ThunkBuilder = fn(&CapabilityHandle, &InvocationRequest) -> Thunk;

/// One candidate way of calling a backend.
#[derive(Clone, Copy)]
pub struct StrategyDescriptor {
    name: &'static str,
    shape: CallingShape,
    build: ThunkBuilder,
}

impl StrategyDescriptor {
    /// The built-in adapter for a calling shape.
    pub fn for_shape(shape: CallingShape) -> Self {
        let build: ThunkBuilder = match shape {
            CallingShape::BatchItem => batch_item,
            CallingShape::ImageWithPrompt => image_with_prompt,
            CallingShape::ImageOnly => image_only,
            CallingShape::PathOnly => path_only,
        };
        Self { name: shape.as_str(), shape, build }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape(&self) -> CallingShape {
        self.shape
    }

    /// Build the call without running it.
    pub fn thunk(&self, capability: &CapabilityHandle, request: &InvocationRequest) -> Thunk {
        (self.build)(capability, request)
    }
}

impl PartialEq for StrategyDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.shape == other.shape
    }
}

impl Eq for StrategyDescriptor {}

impl fmt::Debug for StrategyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyDescriptor")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Fixed, ordered list of strategies for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyCatalog {
    backend: String,
    strategies: Vec<StrategyDescriptor>,
}

impl StrategyCatalog {
    /// Build with the default priority order: richest shape first.
    pub fn build(capability: &CapabilityHandle) -> Self {
        Self::build_with_order(capability, &CallingShape::ALL)
    }

    /// Build with a caller-supplied priority order.
    ///
    /// Shapes the backend does not declare are dropped; duplicates keep their
    /// first position.
    pub fn build_with_order(capability: &CapabilityHandle, order: &[CallingShape]) -> Self {
        let declared = capability.shapes();
        let mut strategies: Vec<StrategyDescriptor> = Vec::with_capacity(order.len());
        for shape in order {
            if !declared.contains(shape) || strategies.iter().any(|s| s.shape == *shape) {
                continue;
            }
            strategies.push(StrategyDescriptor::for_shape(*shape));
        }

        debug!(
            backend = %capability.name(),
            strategies = ?strategies.iter().map(|s| s.name).collect::<Vec<_>>(),
            "Built strategy catalog"
        );

        Self { backend: capability.name().to_string(), strategies }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn iter(&self) -> impl Iterator<Item = &StrategyDescriptor> {
        self.strategies.iter()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name).collect()
    }
}

fn batch_item(capability: &CapabilityHandle, request: &InvocationRequest) -> Thunk {
    let capability = capability.clone();
    let item = PromptedImage {
        image: Arc::clone(request.payload()),
        instruction: request.instruction().to_string(),
    };
    Box::pin(async move {
        let texts = capability.infer_batch(vec![item]).await?;
        texts.into_iter().next().ok_or(InvokeError::EmptyOutput)
    })
}

fn image_with_prompt(capability: &CapabilityHandle, request: &InvocationRequest) -> Thunk {
    let capability = capability.clone();
    let request = request.clone();
    Box::pin(async move {
        capability
            .infer_prompted(request.payload(), request.instruction())
            .await
    })
}

fn image_only(capability: &CapabilityHandle, request: &InvocationRequest) -> Thunk {
    let capability = capability.clone();
    let payload = Arc::clone(request.payload());
    Box::pin(async move { capability.infer_image(&payload).await })
}

fn path_only(capability: &CapabilityHandle, request: &InvocationRequest) -> Thunk {
    let capability = capability.clone();
    let payload = Arc::clone(request.payload());
    Box::pin(async move { capability.infer_path(&payload.path).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_request, Behavior, ScriptedCapability};

    #[test]
    fn default_order_puts_rich_shapes_first() {
        let cap = ScriptedCapability::new().into_handle();
        let catalog = StrategyCatalog::build(&cap);
        assert_eq!(
            catalog.names(),
            vec!["batch_item", "image_with_prompt", "image_only", "path_only"]
        );
    }

    #[test]
    fn build_is_idempotent() {
        let cap = ScriptedCapability::new()
            .declare(&[CallingShape::PathOnly, CallingShape::ImageOnly])
            .into_handle();
        let first = StrategyCatalog::build(&cap);
        let second = StrategyCatalog::build(&cap);
        assert_eq!(first, second);
        assert_eq!(first.names(), vec!["image_only", "path_only"]);
    }

    #[test]
    fn building_never_invokes_the_backend() {
        let scripted = ScriptedCapability::new();
        let calls = scripted.calls();
        let cap = scripted.into_handle();
        let _ = StrategyCatalog::build(&cap);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn custom_order_filters_and_dedupes() {
        let cap = ScriptedCapability::new()
            .declare(&[CallingShape::ImageWithPrompt, CallingShape::PathOnly])
            .into_handle();
        let order = [
            CallingShape::PathOnly,
            CallingShape::BatchItem,
            CallingShape::PathOnly,
            CallingShape::ImageWithPrompt,
        ];
        let catalog = StrategyCatalog::build_with_order(&cap, &order);
        assert_eq!(catalog.names(), vec!["path_only", "image_with_prompt"]);
    }

    #[test]
    fn backend_without_known_shapes_yields_empty_catalog() {
        let cap = ScriptedCapability::new().declare(&[]).into_handle();
        let catalog = StrategyCatalog::build(&cap);
        assert!(catalog.is_empty());
        assert_eq!(catalog.backend(), "scripted");
    }

    #[tokio::test]
    async fn thunks_route_to_the_matching_shape() {
        let scripted = ScriptedCapability::new()
            .on(CallingShape::BatchItem, Behavior::Succeed("from batch"))
            .on(CallingShape::PathOnly, Behavior::Succeed("from path"));
        let calls = scripted.calls();
        let cap = scripted.into_handle();
        let request = sample_request();

        let batch = StrategyDescriptor::for_shape(CallingShape::BatchItem);
        assert_eq!(batch.thunk(&cap, &request).await.unwrap(), "from batch");

        let path = StrategyDescriptor::for_shape(CallingShape::PathOnly);
        assert_eq!(path.thunk(&cap, &request).await.unwrap(), "from path");

        assert_eq!(
            *calls.lock().unwrap(),
            vec![CallingShape::BatchItem, CallingShape::PathOnly]
        );
    }
}
