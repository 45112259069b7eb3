use std::sync::Arc;
use std::time::Duration;

use ocrgate_core::{ImagePayload, DEFAULT_INSTRUCTION};

/// Default ceiling for one strategy attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default ceiling for a whole dispatch sequence.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// One extraction request. Cheap to clone; immutable once built.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    payload: Arc<ImagePayload>,
    instruction: Arc<str>,
    attempt_timeout: Duration,
    deadline: Duration,
}

impl InvocationRequest {
    pub fn new(payload: ImagePayload, instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        let instruction = if instruction.trim().is_empty() {
            DEFAULT_INSTRUCTION.to_string()
        } else {
            instruction
        };
        Self {
            payload: Arc::new(payload),
            instruction: Arc::from(instruction),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn payload(&self) -> &Arc<ImagePayload> {
        &self.payload
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn blank_instruction_falls_back_to_default() {
        let payload = ImagePayload::from_bytes("a.png", Bytes::from_static(b"x"));
        let req = InvocationRequest::new(payload, "   ");
        assert_eq!(req.instruction(), DEFAULT_INSTRUCTION);
        assert_eq!(req.attempt_timeout(), DEFAULT_ATTEMPT_TIMEOUT);
        assert_eq!(req.deadline(), DEFAULT_DEADLINE);
    }
}
