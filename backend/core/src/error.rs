use std::time::Duration;

use thiserror::Error;

use crate::types::CallingShape;

/// User-visible error taxonomy for text extraction.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("no applicable strategy for backend `{backend}`")]
    NoApplicableStrategy { backend: String },

    #[error("strategy `{strategy}` timed out after {after:?}")]
    AttemptTimeout { strategy: String, after: Duration },

    #[error("strategy `{strategy}` failed: {detail}")]
    AttemptExecution { strategy: String, detail: String },

    #[error("deadline exceeded after {attempted} of {total} strategies attempted")]
    DeadlineExceeded { attempted: usize, total: usize },

    #[error(
        "job submission failed ({}): {body}",
        .status.map_or_else(|| "no response".to_string(), |s| format!("status {s}"))
    )]
    Submission { status: Option<u16>, body: String },

    #[error("conversion failed: {0}")]
    JobFailed(String),

    #[error("timed out waiting for conversion after {attempts} polls")]
    PollingTimeout { attempts: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("payload error: {0}")]
    Payload(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error returned by a single backend call.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("calling shape `{0}` is not supported by this backend")]
    Unsupported(CallingShape),

    #[error("backend returned no text")]
    EmptyOutput,

    #[error("{0}")]
    Backend(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InvokeError {
    /// Full error text including any source chain.
    pub fn detail(&self) -> String {
        match self {
            InvokeError::Other(e) => format!("{e:#}"),
            other => other.to_string(),
        }
    }
}
