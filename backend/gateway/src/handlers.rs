//! Route handlers.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use ocrgate_backends::RequestOverrides;
use ocrgate_core::ImagePayload;

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::upload::{StagedUpload, UploadForm};

const NO_IMAGE: &str = "No image file provided";

#[derive(Debug, Serialize)]
pub struct OcrResponse {
    pub text: String,
    pub strategy: String,
    pub elapsed_ms: u64,
}

/// Handler for `GET /`
pub async fn hello() -> Json<Value> {
    Json(json!({ "message": "hello world" }))
}

/// Handler for `GET /api/health`
pub async fn health(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "ocrgate",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.runtime.capability().name(),
        "strategies": state.runtime.catalog().names(),
    }))
}

/// Handler for `POST /ocr`.
///
/// Fields: `image` (required), `instruction`, `attempt_timeout_secs`,
/// `deadline_secs`.
#[instrument(skip_all)]
pub async fn ocr(
    State(state): State<GatewayState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrResponse>, ApiError> {
    let multipart = multipart.map_err(|_| ApiError::BadRequest(NO_IMAGE.into()))?;
    let form = UploadForm::read(multipart, "image").await?;
    let file = form
        .file
        .as_ref()
        .filter(|f| !f.data.is_empty())
        .ok_or_else(|| ApiError::BadRequest(NO_IMAGE.into()))?;

    let overrides = RequestOverrides {
        attempt_timeout: form.seconds("attempt_timeout_secs")?,
        deadline: form.seconds("deadline_secs")?,
    };

    let staged = StagedUpload::write(&state.upload_dir, file).await?;
    let payload = ImagePayload::from_bytes(staged.path(), file.data.clone());
    info!(file = %file.file_name, bytes = file.data.len(), "OCR request");

    let request = state.runtime.request(
        payload,
        form.field("instruction").map(str::to_string),
        overrides,
    );
    let success = state.runtime.extract(&request).await?;

    Ok(Json(OcrResponse {
        text: success.text,
        strategy: success.strategy,
        elapsed_ms: success.elapsed.as_millis() as u64,
    }))
}

/// Handler for `POST /convert`.
///
/// Fields: `file` (required), `output_format`, `mode`. Returns the remote
/// job's result body unchanged.
#[instrument(skip_all)]
pub async fn convert(
    State(state): State<GatewayState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let multipart = multipart.map_err(|_| ApiError::BadRequest("No file provided".into()))?;
    let form = UploadForm::read(multipart, "file").await?;
    let file = form
        .file
        .as_ref()
        .filter(|f| !f.data.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No file provided".into()))?;

    let poller = state.runtime.job_poller()?;
    let options = state.runtime.job_options(
        form.field("output_format").map(str::to_string),
        form.field("mode").map(str::to_string),
    );

    let staged = StagedUpload::write(&state.upload_dir, file).await?;
    let payload = ImagePayload::from_bytes(staged.path(), file.data.clone());
    info!(file = %file.file_name, format = %options.output_format, mode = %options.mode, "Convert request");

    let result = poller.run(&payload, &options).await.into_result()?;
    Ok(Json(result))
}
