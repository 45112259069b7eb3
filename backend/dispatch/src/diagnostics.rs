//! Failure aggregation and classification.
//!
//! The report built here is the only diagnostic a caller gets back, so it
//! keeps every attempted strategy and its error verbatim.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Serialize, Serializer};

use ocrgate_core::OcrError;

use crate::attempt::{AttemptError, AttemptOutcome};

/// Error text that indicates the backend could not be reached at all.
pub const DEFAULT_TRANSIENT_PATTERNS: &[&str] = &[
    r"connection (refused|reset|closed|aborted)",
    r"error trying to connect",
    r"dns error|failed to lookup address|name or service not known",
    r"broken pipe",
    r"temporar(il)?y unavailable",
    r"service unavailable",
    r"bad gateway|gateway time-?out",
    r"\b(502|503|504)\b",
    r"too many requests|\b429\b",
];

static DEFAULT_SIGNATURES: Lazy<TransientSignatures> = Lazy::new(|| {
    TransientSignatures::from_patterns(DEFAULT_TRANSIENT_PATTERNS)
        .unwrap_or_else(|_| TransientSignatures(Vec::new()))
});

/// Case-insensitive patterns that mark an error as transient.
#[derive(Debug, Clone)]
pub struct TransientSignatures(Vec<Regex>);

impl TransientSignatures {
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let compiled = patterns
            .iter()
            .map(|p| RegexBuilder::new(p.as_ref()).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(compiled))
    }

    pub fn matches(&self, text: &str) -> bool {
        self.0.iter().any(|re| re.is_match(text))
    }
}

impl Default for TransientSignatures {
    fn default() -> Self {
        DEFAULT_SIGNATURES.clone()
    }
}

/// Classified reason a dispatch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCause {
    NoApplicableStrategy,
    AllTimedOut,
    BackendUnreachable,
    Mixed,
}

impl RootCause {
    pub fn describe(&self) -> &'static str {
        match self {
            RootCause::NoApplicableStrategy => "no applicable strategy for this backend",
            RootCause::AllTimedOut => "all attempts timed out (backend appears hung)",
            RootCause::BackendUnreachable => "backend unreachable, may succeed on retry",
            RootCause::Mixed => "mixed/unclassified failures",
        }
    }
}

/// How the dispatch sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    NoApplicableStrategy,
    Exhausted,
    DeadlineExceeded { attempted: usize, total: usize },
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::NoApplicableStrategy => f.write_str("no applicable strategy"),
            Termination::Exhausted => f.write_str("all strategies exhausted"),
            Termination::DeadlineExceeded { attempted, total } => write!(
                f,
                "deadline exceeded after {attempted} of {total} strategies attempted"
            ),
        }
    }
}

/// Dispatch state, recorded on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum DispatchState {
    Idle,
    Attempting(usize),
    Succeeded(usize),
    Exhausted,
    DeadlineExceeded,
}

/// Terminal failure value of a dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub backend: String,
    pub root_cause: RootCause,
    pub termination: Termination,
    pub strategies_total: usize,
    /// Failed attempts, in the order they ran.
    pub attempts: Vec<AttemptOutcome>,
    /// First strategy that timed out, if any did.
    pub first_timeout: Option<String>,
    pub transitions: Vec<DispatchState>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl FailureReport {
    /// One-line headline.
    pub fn summary(&self) -> String {
        format!(
            "text extraction failed on backend `{}`: {}; {}",
            self.backend,
            self.termination,
            self.root_cause.describe()
        )
    }

    /// Map the report onto the user-visible error taxonomy.
    pub fn to_error(&self) -> OcrError {
        match self.termination {
            Termination::NoApplicableStrategy => OcrError::NoApplicableStrategy {
                backend: self.backend.clone(),
            },
            Termination::DeadlineExceeded { attempted, total } => {
                OcrError::DeadlineExceeded { attempted, total }
            }
            Termination::Exhausted => match self.attempts.last() {
                Some(last) => last
                    .error()
                    .cloned()
                    .unwrap_or(AttemptError::Execution("unknown failure".into()))
                    .into_ocr_error(&last.strategy),
                None => OcrError::NoApplicableStrategy { backend: self.backend.clone() },
            },
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())?;
        for (i, attempt) in self.attempts.iter().enumerate() {
            let reason = attempt
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "succeeded".to_string());
            write!(
                f,
                "\n  {}. {} ({} ms): {}",
                i + 1,
                attempt.strategy,
                attempt.elapsed.as_millis(),
                reason
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for FailureReport {}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Collects attempt outcomes for one dispatch.
#[derive(Debug)]
pub struct DiagnosticAggregator {
    backend: String,
    strategies_total: usize,
    outcomes: Vec<AttemptOutcome>,
    transitions: Vec<DispatchState>,
    signatures: Arc<TransientSignatures>,
}

impl DiagnosticAggregator {
    pub fn new(
        backend: impl Into<String>,
        strategies_total: usize,
        signatures: Arc<TransientSignatures>,
    ) -> Self {
        Self {
            backend: backend.into(),
            strategies_total,
            outcomes: Vec::new(),
            transitions: vec![DispatchState::Idle],
            signatures,
        }
    }

    pub fn record(&mut self, outcome: AttemptOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn record_transition(&mut self, state: DispatchState) {
        self.transitions.push(state);
    }

    pub fn outcomes(&self) -> &[AttemptOutcome] {
        &self.outcomes
    }

    fn failures(&self) -> impl Iterator<Item = (&AttemptOutcome, &AttemptError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error().map(|e| (o, e)))
    }

    pub fn classify(&self) -> RootCause {
        let errors: Vec<&AttemptError> = self.failures().map(|(_, e)| e).collect();
        if errors.is_empty() {
            return RootCause::NoApplicableStrategy;
        }
        if errors.iter().all(|e| e.is_timeout()) {
            return RootCause::AllTimedOut;
        }
        let all_transient = errors.iter().all(|e| match e {
            AttemptError::Execution(detail) => self.signatures.matches(detail),
            AttemptError::Timeout(_) => false,
        });
        if all_transient {
            RootCause::BackendUnreachable
        } else {
            RootCause::Mixed
        }
    }

    pub fn summarize(&self, termination: Termination, elapsed: Duration) -> FailureReport {
        let root_cause = match termination {
            Termination::NoApplicableStrategy => RootCause::NoApplicableStrategy,
            _ => self.classify(),
        };
        let first_timeout = self
            .failures()
            .find(|(_, e)| e.is_timeout())
            .map(|(o, _)| o.strategy.clone());
        FailureReport {
            backend: self.backend.clone(),
            root_cause,
            termination,
            strategies_total: self.strategies_total,
            attempts: self.failures().map(|(o, _)| o.clone()).collect(),
            first_timeout,
            transitions: self.transitions.clone(),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocrgate_core::CallingShape;

    fn failed(strategy: &str, error: AttemptError) -> AttemptOutcome {
        AttemptOutcome {
            strategy: strategy.to_string(),
            shape: CallingShape::ImageOnly,
            elapsed: Duration::from_millis(10),
            result: Err(error),
        }
    }

    fn aggregator() -> DiagnosticAggregator {
        DiagnosticAggregator::new("ollama", 3, Arc::new(TransientSignatures::default()))
    }

    #[test]
    fn all_timeouts_classify_as_hang() {
        let mut agg = aggregator();
        agg.record(failed("a", AttemptError::Timeout(Duration::from_secs(1))));
        agg.record(failed("b", AttemptError::Timeout(Duration::from_secs(1))));
        assert_eq!(agg.classify(), RootCause::AllTimedOut);
    }

    #[test]
    fn transient_errors_classify_as_unreachable() {
        let mut agg = aggregator();
        agg.record(failed(
            "a",
            AttemptError::Execution(
                "POST http://localhost:11434/api/generate: error trying to connect: tcp connect error: Connection refused (os error 111)".into(),
            ),
        ));
        agg.record(failed("b", AttemptError::Execution("backend returned 503 Service Unavailable".into())));
        assert_eq!(agg.classify(), RootCause::BackendUnreachable);
    }

    #[test]
    fn timeout_plus_transient_is_mixed() {
        let mut agg = aggregator();
        agg.record(failed("a", AttemptError::Timeout(Duration::from_secs(1))));
        agg.record(failed("b", AttemptError::Execution("Connection reset by peer".into())));
        assert_eq!(agg.classify(), RootCause::Mixed);
    }

    #[test]
    fn unsupported_shape_is_mixed() {
        let mut agg = aggregator();
        agg.record(failed(
            "a",
            AttemptError::Execution("calling shape `batch_item` is not supported by this backend".into()),
        ));
        assert_eq!(agg.classify(), RootCause::Mixed);
    }

    #[test]
    fn summary_keeps_every_attempt_in_order() {
        let mut agg = aggregator();
        agg.record(failed("batch_item", AttemptError::Execution("bad args".into())));
        agg.record(failed("image_only", AttemptError::Timeout(Duration::from_secs(2))));
        agg.record(failed("path_only", AttemptError::Timeout(Duration::from_secs(2))));

        let report = agg.summarize(Termination::Exhausted, Duration::from_secs(4));
        let names: Vec<_> = report.attempts.iter().map(|a| a.strategy.as_str()).collect();
        assert_eq!(names, vec!["batch_item", "image_only", "path_only"]);
        assert_eq!(report.first_timeout.as_deref(), Some("image_only"));
        assert_eq!(report.root_cause, RootCause::Mixed);

        let text = report.to_string();
        assert!(text.contains("bad args"));
        assert!(text.contains("2. image_only"));
        assert!(matches!(report.to_error(), OcrError::AttemptTimeout { ref strategy, .. } if strategy == "path_only"));
    }

    #[test]
    fn empty_catalog_report() {
        let agg = DiagnosticAggregator::new("command", 0, Arc::new(TransientSignatures::default()));
        let report = agg.summarize(Termination::NoApplicableStrategy, Duration::ZERO);
        assert_eq!(report.root_cause, RootCause::NoApplicableStrategy);
        assert!(report.attempts.is_empty());
        assert!(matches!(report.to_error(), OcrError::NoApplicableStrategy { .. }));
    }

    #[test]
    fn report_serializes_for_api_callers() {
        let mut agg = aggregator();
        agg.record(failed("a", AttemptError::Timeout(Duration::from_secs(1))));
        agg.record_transition(DispatchState::Attempting(0));
        agg.record_transition(DispatchState::DeadlineExceeded);
        let report = agg.summarize(
            Termination::DeadlineExceeded { attempted: 1, total: 3 },
            Duration::from_millis(1200),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["termination"]["kind"], "deadline_exceeded");
        assert_eq!(json["termination"]["attempted"], 1);
        assert_eq!(json["root_cause"], "all_timed_out");
        assert_eq!(json["elapsed_ms"], 1200);
        assert_eq!(json["transitions"][1]["state"], "attempting");
        assert_eq!(json["transitions"][1]["index"], 0);
    }

    #[test]
    fn custom_signatures_are_case_insensitive() {
        let sigs = TransientSignatures::from_patterns(&["cuda out of memory"]).unwrap();
        assert!(sigs.matches("RuntimeError: CUDA out of memory. Tried to allocate"));
        assert!(!sigs.matches("invalid prompt"));
    }
}
