//! Loaded input files.
//!
//! Decoding is left to the backend; the engine only needs the bytes, a path
//! the backend can open, and a MIME type for transports that want one.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;

use crate::error::OcrError;

/// An input file held in memory alongside the path it was read from.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl ImagePayload {
    /// Read a file from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, OcrError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| OcrError::Payload(format!("failed to read {}: {e}", path.display())))?;
        if data.is_empty() {
            return Err(OcrError::Payload(format!("{} is empty", path.display())));
        }
        Ok(Self::from_bytes(path, Bytes::from(data)))
    }

    /// Wrap bytes that already live at `path`.
    pub fn from_bytes(path: impl Into<PathBuf>, data: Bytes) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin")
            .to_string();
        let mime_type = sniff_mime_type(&data)
            .unwrap_or_else(|| detect_mime_type(&path))
            .to_string();
        Self { path, file_name, mime_type, data }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Detect MIME type by file extension.
pub fn detect_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Detect MIME type from leading magic bytes.
fn sniff_mime_type(data: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"BM", "image/bmp"),
        (b"II*\0", "image/tiff"),
        (b"MM\0*", "image/tiff"),
    ];
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    SIGNATURES
        .iter()
        .find(|(magic, _)| data.starts_with(magic))
        .map(|(_, mime)| *mime)
}
