//! HTTP error mapping.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use ocrgate_core::OcrError;
use ocrgate_dispatch::{FailureReport, RootCause, Termination};
use ocrgate_logging::redact_sensitive_data;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Dispatch(Box<FailureReport>),

    #[error(transparent)]
    Ocr(#[from] OcrError),
}

impl From<FailureReport> for ApiError {
    fn from(report: FailureReport) -> Self {
        ApiError::Dispatch(Box::new(report))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Dispatch(report) => report_status(report),
            ApiError::Ocr(e) => ocr_status(e),
        }
    }
}

fn report_status(report: &FailureReport) -> StatusCode {
    if matches!(report.termination, Termination::DeadlineExceeded { .. }) {
        return StatusCode::GATEWAY_TIMEOUT;
    }
    match report.root_cause {
        RootCause::NoApplicableStrategy => StatusCode::NOT_IMPLEMENTED,
        RootCause::AllTimedOut => StatusCode::GATEWAY_TIMEOUT,
        RootCause::BackendUnreachable => StatusCode::SERVICE_UNAVAILABLE,
        RootCause::Mixed => StatusCode::BAD_GATEWAY,
    }
}

fn ocr_status(error: &OcrError) -> StatusCode {
    match error {
        OcrError::NoApplicableStrategy { .. } => StatusCode::NOT_IMPLEMENTED,
        OcrError::AttemptTimeout { .. }
        | OcrError::DeadlineExceeded { .. }
        | OcrError::PollingTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        OcrError::AttemptExecution { .. } | OcrError::Submission { .. } => StatusCode::BAD_GATEWAY,
        OcrError::JobFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OcrError::Config(_) | OcrError::Payload(_) | OcrError::Other(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Dispatch(report) => json!({
                "error": report.summary(),
                "report": report,
            }),
            ApiError::Multipart(e) => json!({ "error": e.body_text() }),
            other => json!({ "error": redact_sensitive_data(&format!("{other:#}")) }),
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(body)).into_response()
    }
}
