//! `ocrgate-jobs`: submit-then-poll client for remote document conversion.

pub mod poller;
pub mod transport;
pub mod types;

pub use poller::{
    JobPoller, PollPolicy, DEFAULT_CHECK_TIMEOUT, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL,
};
pub use transport::{
    HttpJobTransport, JobTransport, CHECK_URL_FIELD, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT,
};
pub use types::{Job, JobHandle, JobOptions, JobOutcome, JobStatus};
