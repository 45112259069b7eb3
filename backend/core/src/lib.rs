pub mod error;
pub mod payload;
pub mod traits;
pub mod types;

pub use error::{InvokeError, OcrError};
pub use payload::{detect_mime_type, ImagePayload};
pub use traits::{CapabilityHandle, InferenceCapability};
pub use types::{CallingShape, PromptedImage, DEFAULT_INSTRUCTION};
