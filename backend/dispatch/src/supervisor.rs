//! Sequential strategy dispatch under a single overall deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use ocrgate_core::{CallingShape, CapabilityHandle};

use crate::attempt::{AttemptOutcome, BoundedAttempt};
use crate::catalog::StrategyCatalog;
use crate::diagnostics::{
    DiagnosticAggregator, DispatchState, FailureReport, Termination, TransientSignatures,
};
use crate::request::InvocationRequest;

/// Text produced by the first strategy that worked.
#[derive(Debug, Clone)]
pub struct DispatchSuccess {
    pub text: String,
    pub strategy: String,
    pub shape: CallingShape,
    /// Strategies started, including the winning one.
    pub attempts: usize,
    pub elapsed: Duration,
    /// Earlier strategies that failed before the winner.
    pub failures: Vec<AttemptOutcome>,
}

/// Drives a strategy catalog through bounded attempts under one deadline.
///
/// Strategies run strictly in catalog order, one at a time, each at most
/// once. The first success ends the sequence.
#[derive(Clone)]
pub struct DispatchSupervisor {
    catalog: Arc<StrategyCatalog>,
    attempt: BoundedAttempt,
    signatures: Arc<TransientSignatures>,
}

impl DispatchSupervisor {
    pub fn new(catalog: Arc<StrategyCatalog>) -> Self {
        Self {
            catalog,
            attempt: BoundedAttempt::new(),
            signatures: Arc::new(TransientSignatures::default()),
        }
    }

    pub fn with_attempt_runner(mut self, attempt: BoundedAttempt) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_transient_signatures(mut self, signatures: TransientSignatures) -> Self {
        self.signatures = Arc::new(signatures);
        self
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    #[instrument(skip_all, fields(backend = %capability.name(), file = %request.payload().file_name))]
    pub async fn dispatch(
        &self,
        capability: &CapabilityHandle,
        request: &InvocationRequest,
    ) -> Result<DispatchSuccess, FailureReport> {
        let started = Instant::now();
        let total = self.catalog.len();
        let deadline = request.deadline();
        let mut diagnostics =
            DiagnosticAggregator::new(capability.name(), total, Arc::clone(&self.signatures));

        if self.catalog.is_empty() {
            warn!("No applicable strategy for backend");
            return Err(diagnostics.summarize(Termination::NoApplicableStrategy, started.elapsed()));
        }

        info!(
            strategies = total,
            attempt_timeout_secs = request.attempt_timeout().as_secs_f64(),
            deadline_secs = deadline.as_secs_f64(),
            "Dispatching extraction"
        );

        for (index, strategy) in self.catalog.iter().enumerate() {
            let remaining = deadline.saturating_sub(started.elapsed());
            diagnostics.record_transition(DispatchState::Attempting(index));
            let budget = request.attempt_timeout().min(remaining);
            debug!(
                strategy = strategy.name(),
                index,
                budget_ms = budget.as_millis() as u64,
                "Starting attempt"
            );

            let thunk = strategy.thunk(capability, request);
            let outcome = self.attempt.run(strategy, thunk, budget).await;

            if let Ok(text) = &outcome.result {
                diagnostics.record_transition(DispatchState::Succeeded(index));
                let elapsed = started.elapsed();
                info!(
                    strategy = strategy.name(),
                    attempts = index + 1,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Extraction succeeded"
                );
                return Ok(DispatchSuccess {
                    text: text.clone(),
                    strategy: outcome.strategy.clone(),
                    shape: outcome.shape,
                    attempts: index + 1,
                    elapsed,
                    failures: diagnostics.outcomes().to_vec(),
                });
            }

            if let Some(error) = outcome.error() {
                warn!(strategy = strategy.name(), error = %error, "Strategy failed");
            }
            diagnostics.record(outcome);

            let elapsed = started.elapsed();
            if elapsed >= deadline {
                diagnostics.record_transition(DispatchState::DeadlineExceeded);
                let report = diagnostics.summarize(
                    Termination::DeadlineExceeded { attempted: index + 1, total },
                    elapsed,
                );
                warn!(report = %report.summary(), "Dispatch deadline exceeded");
                return Err(report);
            }
        }

        diagnostics.record_transition(DispatchState::Exhausted);
        let report = diagnostics.summarize(Termination::Exhausted, started.elapsed());
        warn!(report = %report.summary(), "All strategies failed");
        Err(report)
    }
}
