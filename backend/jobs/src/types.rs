use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ocrgate_core::OcrError;

/// Remote-issued token used to check on a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(check: impl Into<String>) -> Self {
        Self(check.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Conversion options sent with the submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub output_format: String,
    pub mode: String,
    /// Additional form fields passed through untouched.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            output_format: "markdown".to_string(),
            mode: "balanced".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Anything that is not terminal, including statuses we do not know.
    Pending,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Snapshot of a job as reported by one status check.
#[derive(Debug, Clone)]
pub struct Job {
    pub handle: JobHandle,
    pub status: JobStatus,
    /// Status string exactly as the remote sent it.
    pub raw_status: Option<String>,
    /// Full response body, present iff complete.
    pub result: Option<Value>,
    /// Remote error text, present iff failed.
    pub error: Option<String>,
}

impl Job {
    /// Interpret one status-check response body.
    pub fn from_response(handle: JobHandle, body: Value) -> Self {
        let raw_status = body.get("status").and_then(Value::as_str).map(str::to_string);
        let status = match raw_status.as_deref() {
            Some("complete") => JobStatus::Complete,
            Some("failed") => JobStatus::Failed,
            _ => JobStatus::Pending,
        };
        let error = match status {
            JobStatus::Failed => Some(match body.get("error") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "no error detail provided".to_string(),
                Some(other) => other.to_string(),
            }),
            _ => None,
        };
        let result = match status {
            JobStatus::Complete => Some(body),
            _ => None,
        };
        Self { handle, status, raw_status, result, error }
    }
}

/// How a submit-then-poll run ended.
#[derive(Debug)]
pub enum JobOutcome {
    Complete { handle: JobHandle, result: Value, polls: u32 },
    /// The remote reported failure; `error` is its text, unmodified.
    Failed { handle: JobHandle, error: String, polls: u32 },
    /// The attempt budget ran out before a terminal status. Safe to resubmit.
    PollingTimeout { handle: JobHandle, polls: u32 },
    /// The submission itself was rejected; nothing was polled.
    Rejected(OcrError),
}

impl JobOutcome {
    pub fn into_result(self) -> Result<Value, OcrError> {
        match self {
            JobOutcome::Complete { result, .. } => Ok(result),
            JobOutcome::Failed { error, .. } => Err(OcrError::JobFailed(error)),
            JobOutcome::PollingTimeout { polls, .. } => {
                Err(OcrError::PollingTimeout { attempts: polls })
            }
            JobOutcome::Rejected(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handle() -> JobHandle {
        JobHandle::new("https://example.test/check/1")
    }

    #[test]
    fn complete_keeps_whole_body_as_result() {
        let job = Job::from_response(handle(), json!({"status": "complete", "markdown": "# Hi"}));
        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.result.unwrap()["markdown"], "# Hi");
        assert!(job.error.is_none());
    }

    #[test]
    fn failed_error_is_verbatim() {
        let job = Job::from_response(
            handle(),
            json!({"status": "failed", "error": "PDF is encrypted"}),
        );
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("PDF is encrypted"));
        assert!(job.result.is_none());
    }

    #[test]
    fn unknown_or_missing_status_keeps_polling() {
        let processing = Job::from_response(handle(), json!({"status": "processing"}));
        assert_eq!(processing.status, JobStatus::Pending);
        assert_eq!(processing.raw_status.as_deref(), Some("processing"));

        let missing = Job::from_response(handle(), json!({"detail": "?"}));
        assert_eq!(missing.status, JobStatus::Pending);
        assert!(!missing.status.is_terminal());
    }

    #[test]
    fn outcomes_map_to_distinct_errors() {
        let timeout = JobOutcome::PollingTimeout { handle: handle(), polls: 300 };
        assert!(matches!(
            timeout.into_result(),
            Err(OcrError::PollingTimeout { attempts: 300 })
        ));
        let failed = JobOutcome::Failed { handle: handle(), error: "boom".into(), polls: 1 };
        assert!(matches!(failed.into_result(), Err(OcrError::JobFailed(e)) if e == "boom"));
    }

    #[test]
    fn options_default_to_markdown_balanced() {
        let options = JobOptions::default();
        assert_eq!(options.output_format, "markdown");
        assert_eq!(options.mode, "balanced");
    }
}
