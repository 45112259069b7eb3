//! `ocrgate-dispatch`: bounded-time dispatch over an inference backend.
//!
//! Provides:
//! - `StrategyCatalog`: ordered calling shapes for one backend
//! - `BoundedAttempt`: one strategy under a hard timeout, abandon-on-timeout
//! - `DispatchSupervisor`: first-success-wins under an overall deadline
//! - `DiagnosticAggregator`: failure classification and the final report

pub mod attempt;
pub mod catalog;
pub mod diagnostics;
pub mod request;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use attempt::{
    AttemptError, AttemptOutcome, BoundedAttempt, Heartbeat, HeartbeatObserver, OnTimeout,
    DEFAULT_HEARTBEAT_INTERVAL,
};
pub use catalog::{StrategyCatalog, StrategyDescriptor, Thunk};
pub use diagnostics::{
    DiagnosticAggregator, DispatchState, FailureReport, RootCause, Termination,
    TransientSignatures, DEFAULT_TRANSIENT_PATTERNS,
};
pub use request::{InvocationRequest, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_DEADLINE};
pub use supervisor::{DispatchSuccess, DispatchSupervisor};
