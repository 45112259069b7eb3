//! Multipart parsing and staged upload files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::Multipart;
use tracing::{debug, warn};

use ocrgate_core::OcrError;

use crate::error::ApiError;

/// A file part from a multipart form.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

/// All parts of a multipart form: one named file plus text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    /// Read the whole form, keeping the first part named `file_field`.
    pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else { continue };
            if name == file_field {
                let file_name = field.file_name().unwrap_or("upload.bin").to_string();
                let data = field.bytes().await?;
                if form.file.is_none() {
                    form.file = Some(UploadedFile { file_name, data });
                }
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// A text field, trimmed; blank counts as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// A positive number of seconds.
    pub fn seconds(&self, name: &str) -> Result<Option<std::time::Duration>, ApiError> {
        let Some(raw) = self.field(name) else { return Ok(None) };
        raw.parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .and_then(|secs| std::time::Duration::try_from_secs_f64(secs).ok())
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("{name} must be a positive number of seconds")))
    }
}

/// An upload written to disk for the duration of one request.
///
/// The file is removed when the guard drops, whichever way the handler exits.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
}

impl StagedUpload {
    pub async fn write(dir: &Path, file: &UploadedFile) -> Result<Self, OcrError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| OcrError::Payload(format!("failed to create {}: {e}", dir.display())))?;
        let path = dir.join(format!("{}-{}", uuid::Uuid::new_v4(), sanitize(&file.file_name)));
        tokio::fs::write(&path, &file.data)
            .await
            .map_err(|e| OcrError::Payload(format!("failed to stage upload: {e}")))?;
        debug!(path = %path.display(), bytes = file.data.len(), "Staged upload");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload");
            }
        }
    }
}

/// Keep only the final path component and a conservative character set.
fn sanitize(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.bin");
    let clean: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if clean.trim_matches('.').is_empty() {
        "upload.bin".to_string()
    } else {
        clean
    }
}
