use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use ocrgate_core::ImagePayload;

use crate::transport::JobTransport;
use crate::types::{Job, JobHandle, JobOptions, JobOutcome, JobStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_POLLS: u32 = 300;
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounded polling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollPolicy {
    #[serde(with = "secs")]
    pub interval: Duration,
    pub max_polls: u32,
    /// Upper bound on a single status check; an elapsed check counts as a failed poll.
    #[serde(with = "secs", default = "default_check_timeout")]
    pub check_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }
}

fn default_check_timeout() -> Duration {
    DEFAULT_CHECK_TIMEOUT
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Submits a job and polls it to a terminal status.
///
/// The first check happens right after submission; later checks are spaced
/// by `policy.interval`. A check that errors or outlives `policy.check_timeout`
/// is logged and uses up one poll.
pub struct JobPoller<T: JobTransport> {
    transport: Arc<T>,
    policy: PollPolicy,
}

impl<T: JobTransport> Clone for JobPoller<T> {
    fn clone(&self) -> Self {
        Self { transport: Arc::clone(&self.transport), policy: self.policy }
    }
}

impl<T: JobTransport> JobPoller<T> {
    pub fn new(transport: T) -> Self {
        Self { transport: Arc::new(transport), policy: PollPolicy::default() }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submit and wait for the result.
    #[instrument(skip_all, fields(file = %payload.file_name))]
    pub async fn run(&self, payload: &ImagePayload, options: &JobOptions) -> JobOutcome {
        match self.transport.submit(payload, options).await {
            Ok(handle) => {
                info!(handle = %handle, "Conversion job submitted");
                self.wait(handle).await
            }
            Err(e) => {
                warn!(error = %e, "Conversion job rejected");
                JobOutcome::Rejected(e)
            }
        }
    }

    /// One status check.
    pub async fn poll(&self, handle: &JobHandle) -> Result<Job> {
        let body = tokio::time::timeout(self.policy.check_timeout, self.transport.check(handle))
            .await
            .map_err(|_| anyhow!("status check timed out after {:?}", self.policy.check_timeout))??;
        Ok(Job::from_response(handle.clone(), body))
    }

    /// Poll an already-submitted job until it is terminal or the budget runs out.
    pub async fn wait(&self, handle: JobHandle) -> JobOutcome {
        let max = self.policy.max_polls;
        for poll in 1..=max {
            match self.poll(&handle).await {
                Ok(job) => match job.status {
                    JobStatus::Complete => {
                        info!(handle = %handle, polls = poll, "Conversion complete");
                        return JobOutcome::Complete {
                            handle,
                            result: job.result.unwrap_or_default(),
                            polls: poll,
                        };
                    }
                    JobStatus::Failed => {
                        let error = job.error.unwrap_or_default();
                        warn!(handle = %handle, polls = poll, error = %error, "Conversion failed");
                        return JobOutcome::Failed { handle, error, polls: poll };
                    }
                    JobStatus::Pending => {
                        debug!(
                            handle = %handle,
                            poll,
                            status = job.raw_status.as_deref().unwrap_or("unknown"),
                            "Conversion pending"
                        );
                    }
                },
                Err(e) => {
                    warn!(handle = %handle, poll, error = %format!("{e:#}"), "Status check failed");
                }
            }
            if poll < max {
                tokio::time::sleep(self.policy.interval).await;
            }
        }
        warn!(handle = %handle, polls = max, "Gave up waiting for conversion");
        JobOutcome::PollingTimeout { handle, polls: max }
    }
}
