//! Structured logging for ocrgate.
//!
//! Console output, an optional rolling NDJSON file, and scrubbing of
//! credentials out of backend error text.

pub mod logger;
pub mod redact;

pub use logger::{init_logger, LoggerGuard};
pub use redact::redact_sensitive_data;
