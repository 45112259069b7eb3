use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::payload::ImagePayload;

/// One concrete way of calling an inference backend.
///
/// Backends rarely agree on a calling convention, so the dispatch engine
/// treats each convention as a separate candidate and tries them in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallingShape {
    /// A list of rich input items, each carrying an image and an instruction.
    BatchItem,
    /// The image and the instruction as two positional arguments.
    ImageWithPrompt,
    /// The image alone; the backend applies its own instruction.
    ImageOnly,
    /// A filesystem path to the image.
    PathOnly,
}

impl CallingShape {
    /// Every known shape, in the default priority order.
    pub const ALL: [CallingShape; 4] = [
        CallingShape::BatchItem,
        CallingShape::ImageWithPrompt,
        CallingShape::ImageOnly,
        CallingShape::PathOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallingShape::BatchItem => "batch_item",
            CallingShape::ImageWithPrompt => "image_with_prompt",
            CallingShape::ImageOnly => "image_only",
            CallingShape::PathOnly => "path_only",
        }
    }
}

impl fmt::Display for CallingShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallingShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "batch_item" | "batch" => Ok(CallingShape::BatchItem),
            "image_with_prompt" | "prompted" => Ok(CallingShape::ImageWithPrompt),
            "image_only" | "image" => Ok(CallingShape::ImageOnly),
            "path_only" | "path" => Ok(CallingShape::PathOnly),
            other => Err(format!("unknown calling shape: {other}")),
        }
    }
}

/// Input item for the batch calling shape.
#[derive(Debug, Clone)]
pub struct PromptedImage {
    pub image: Arc<ImagePayload>,
    pub instruction: String,
}

/// Default instruction used when the caller does not supply one.
pub const DEFAULT_INSTRUCTION: &str =
    "Extract all text from this image. Preserve reading order and layout as markdown.";
