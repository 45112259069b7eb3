//! `ocrgate-backends`: concrete inference backends and startup wiring.
//!
//! Backends:
//! - `command`: a local OCR executable driven by argument templates
//! - `openai`: OpenAI-compatible vision chat completions
//! - `ollama`: Ollama `/api/generate` with inline images
//! - `mock`: canned text

pub mod command;
pub mod mock;
pub mod resolve;
pub mod vision;

pub use command::{find_program, CommandCapability};
pub use mock::MockCapability;
pub use resolve::{
    build_supervisor, job_poller, resolve_capability, strategy_order, RequestOverrides, Runtime,
};
pub use vision::{OllamaVision, OpenAiVision};
