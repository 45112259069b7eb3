//! Bounded attempt: run one strategy on its own task with a hard ceiling.
//!
//! The caller never waits longer than the timeout. On timeout the worker is
//! abandoned by default: it keeps running in the background and whatever it
//! eventually returns is dropped. `OnTimeout::Abort` additionally aborts the
//! task, which stops async work at its next await point but cannot interrupt
//! code that is blocking a thread.

use std::sync::Arc;
use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use ocrgate_core::{CallingShape, InvokeError, OcrError};

use crate::catalog::{StrategyDescriptor, Thunk};

/// Default spacing between "still running" signals.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// What happens to the worker when its attempt times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnTimeout {
    /// Stop waiting; let the worker run to completion and discard its result.
    #[default]
    Detach,
    /// Stop waiting and abort the worker task.
    Abort,
}

/// Why one attempt did not produce text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Execution(String),
}

impl AttemptError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptError::Timeout(_))
    }

    /// Convert into the user-visible taxonomy, attributed to a strategy.
    pub fn into_ocr_error(self, strategy: &str) -> OcrError {
        match self {
            AttemptError::Timeout(after) => OcrError::AttemptTimeout {
                strategy: strategy.to_string(),
                after,
            },
            AttemptError::Execution(detail) => OcrError::AttemptExecution {
                strategy: strategy.to_string(),
                detail,
            },
        }
    }
}

/// Result of one timed strategy execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub strategy: String,
    pub shape: CallingShape,
    pub elapsed: Duration,
    pub result: Result<String, AttemptError>,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&AttemptError> {
        self.result.as_ref().err()
    }
}

impl Serialize for AttemptOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("AttemptOutcome", 4)?;
        s.serialize_field("strategy", &self.strategy)?;
        s.serialize_field("elapsed_ms", &(self.elapsed.as_millis() as u64))?;
        match &self.result {
            Ok(_) => {
                s.serialize_field("outcome", "success")?;
                s.serialize_field("error", &Option::<String>::None)?;
            }
            Err(AttemptError::Timeout(_)) => {
                s.serialize_field("outcome", "timeout")?;
                s.serialize_field("error", &self.result.as_ref().err().map(|e| e.to_string()))?;
            }
            Err(AttemptError::Execution(detail)) => {
                s.serialize_field("outcome", "error")?;
                s.serialize_field("error", detail)?;
            }
        }
        s.end()
    }
}

/// Progress signal emitted while an attempt is still running.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub strategy: &'static str,
    pub elapsed: Duration,
    pub beat: u32,
}

/// Callback invoked for every heartbeat.
pub type HeartbeatObserver = Arc<dyn Fn(&Heartbeat) + Send + Sync>;

/// Runs one strategy thunk under a timeout.
#[derive(Clone)]
pub struct BoundedAttempt {
    heartbeat_interval: Duration,
    on_timeout: OnTimeout,
    observer: Option<HeartbeatObserver>,
}

impl BoundedAttempt {
    pub fn new() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            on_timeout: OnTimeout::default(),
            observer: None,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn on_timeout(mut self, policy: OnTimeout) -> Self {
        self.on_timeout = policy;
        self
    }

    pub fn with_observer(mut self, observer: HeartbeatObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run `thunk` on a separate task and wait at most `timeout` for it.
    pub async fn run(
        &self,
        strategy: &StrategyDescriptor,
        thunk: Thunk,
        timeout: Duration,
    ) -> AttemptOutcome {
        let started = Instant::now();
        let mut worker = tokio::spawn(thunk);

        let expiry = tokio::time::sleep(timeout);
        tokio::pin!(expiry);

        let mut ticker = tokio::time::interval_at(
            started + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut beat = 0u32;

        let joined = loop {
            tokio::select! {
                biased;
                joined = &mut worker => break Some(joined),
                _ = &mut expiry => break None,
                _ = ticker.tick() => {
                    beat += 1;
                    let heartbeat = Heartbeat {
                        strategy: strategy.name(),
                        elapsed: started.elapsed(),
                        beat,
                    };
                    info!(
                        strategy = heartbeat.strategy,
                        elapsed_secs = heartbeat.elapsed.as_secs(),
                        beat,
                        "Attempt still running"
                    );
                    if let Some(observer) = &self.observer {
                        observer(&heartbeat);
                    }
                }
            }
        };

        let result = match joined {
            Some(Ok(Ok(text))) if text.trim().is_empty() => {
                Err(AttemptError::Execution(InvokeError::EmptyOutput.to_string()))
            }
            Some(Ok(Ok(text))) => Ok(text),
            Some(Ok(Err(e))) => Err(AttemptError::Execution(e.detail())),
            Some(Err(join_error)) => Err(AttemptError::Execution(describe_join_error(join_error))),
            None => {
                match self.on_timeout {
                    OnTimeout::Detach => {
                        warn!(
                            strategy = strategy.name(),
                            timeout_ms = timeout.as_millis() as u64,
                            "Attempt timed out; worker left running in background"
                        );
                    }
                    OnTimeout::Abort => {
                        worker.abort();
                        warn!(
                            strategy = strategy.name(),
                            timeout_ms = timeout.as_millis() as u64,
                            "Attempt timed out; worker aborted"
                        );
                    }
                }
                Err(AttemptError::Timeout(timeout))
            }
        };

        let elapsed = started.elapsed();
        debug!(
            strategy = strategy.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            ok = result.is_ok(),
            "Attempt finished"
        );

        AttemptOutcome {
            strategy: strategy.name().to_string(),
            shape: strategy.shape(),
            elapsed,
            result,
        }
    }
}

impl Default for BoundedAttempt {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_join_error(error: JoinError) -> String {
    if error.is_panic() {
        let panic = error.into_panic();
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("worker panicked: {message}")
    } else {
        format!("worker cancelled: {error}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use crate::testing::{sample_request, Behavior, ScriptedCapability};

    fn descriptor(shape: CallingShape) -> StrategyDescriptor {
        StrategyDescriptor::for_shape(shape)
    }

    #[tokio::test(start_paused = true)]
    async fn returns_worker_text() {
        let cap = ScriptedCapability::new()
            .on(CallingShape::ImageOnly, Behavior::Delay(Duration::from_secs(3), "hello"))
            .into_handle();
        let strategy = descriptor(CallingShape::ImageOnly);
        let thunk = strategy.thunk(&cap, &sample_request());

        let outcome = BoundedAttempt::new()
            .run(&strategy, thunk, Duration::from_secs(10))
            .await;

        assert_eq!(outcome.result, Ok("hello".to_string()));
        assert_eq!(outcome.strategy, "image_only");
        assert!(outcome.elapsed >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn caller_wait_is_bounded_by_timeout() {
        let cap = ScriptedCapability::new()
            .on(CallingShape::PathOnly, Behavior::Hang)
            .into_handle();
        let strategy = descriptor(CallingShape::PathOnly);
        let thunk = strategy.thunk(&cap, &sample_request());

        let started = Instant::now();
        let outcome = BoundedAttempt::new()
            .run(&strategy, thunk, Duration::from_secs(5))
            .await;

        assert_eq!(outcome.result, Err(AttemptError::Timeout(Duration::from_secs(5))));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn detached_worker_keeps_running_after_timeout() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let thunk: Thunk = Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            flag.store(true, Ordering::SeqCst);
            Ok("late".to_string())
        });
        let strategy = descriptor(CallingShape::ImageOnly);

        let outcome = BoundedAttempt::new()
            .run(&strategy, thunk, Duration::from_secs(5))
            .await;
        assert!(outcome.error().is_some_and(AttemptError::is_timeout));
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(finished.load(Ordering::SeqCst), "abandoned worker should still complete");
    }

    #[tokio::test(start_paused = true)]
    async fn abort_policy_stops_async_worker() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let thunk: Thunk = Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            flag.store(true, Ordering::SeqCst);
            Ok("late".to_string())
        });
        let strategy = descriptor(CallingShape::ImageOnly);

        let outcome = BoundedAttempt::new()
            .on_timeout(OnTimeout::Abort)
            .run(&strategy, thunk, Duration::from_secs(5))
            .await;
        assert!(outcome.error().is_some_and(AttemptError::is_timeout));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!finished.load(Ordering::SeqCst), "aborted worker must not complete");
    }

    #[tokio::test]
    async fn backend_error_and_panic_become_execution_errors() {
        let cap = ScriptedCapability::new()
            .on(CallingShape::ImageOnly, Behavior::Fail("model not loaded"))
            .on(CallingShape::PathOnly, Behavior::Panic)
            .into_handle();
        let runner = BoundedAttempt::new();
        let request = sample_request();

        let image = descriptor(CallingShape::ImageOnly);
        let outcome = runner
            .run(&image, image.thunk(&cap, &request), Duration::from_secs(5))
            .await;
        assert_eq!(outcome.result, Err(AttemptError::Execution("model not loaded".into())));

        let path = descriptor(CallingShape::PathOnly);
        let outcome = runner
            .run(&path, path.thunk(&cap, &request), Duration::from_secs(5))
            .await;
        match outcome.result {
            Err(AttemptError::Execution(detail)) => {
                assert!(detail.starts_with("worker panicked"), "{detail}");
            }
            other => panic!("expected execution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_text_is_not_a_success() {
        let cap = ScriptedCapability::new()
            .on(CallingShape::ImageOnly, Behavior::Succeed("  \n"))
            .into_handle();
        let strategy = descriptor(CallingShape::ImageOnly);
        let outcome = BoundedAttempt::new()
            .run(&strategy, strategy.thunk(&cap, &sample_request()), Duration::from_secs(5))
            .await;
        assert!(!outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_fire_without_changing_timing() {
        let beats = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&beats);
        let cap = ScriptedCapability::new()
            .on(CallingShape::ImageOnly, Behavior::Delay(Duration::from_secs(250), "done"))
            .into_handle();
        let strategy = descriptor(CallingShape::ImageOnly);

        let started = Instant::now();
        let outcome = BoundedAttempt::new()
            .with_heartbeat_interval(Duration::from_secs(60))
            .with_observer(Arc::new(move |_hb: &Heartbeat| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .run(&strategy, strategy.thunk(&cap, &sample_request()), Duration::from_secs(600))
            .await;

        assert_eq!(outcome.result, Ok("done".to_string()));
        assert_eq!(beats.load(Ordering::SeqCst), 4);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(250) && waited < Duration::from_secs(251));
    }

    #[test]
    fn outcome_serializes_error_text() {
        let outcome = AttemptOutcome {
            strategy: "path_only".into(),
            shape: CallingShape::PathOnly,
            elapsed: Duration::from_millis(1500),
            result: Err(AttemptError::Timeout(Duration::from_secs(1))),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "timeout");
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["error"], "timed out after 1s");
    }
}
