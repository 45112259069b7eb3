//! Wire protocol for the remote conversion service.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, warn};

use ocrgate_core::{ImagePayload, OcrError};

use crate::types::{JobHandle, JobOptions};

/// Default endpoint of the hosted conversion API.
pub const DEFAULT_API_URL: &str = "https://www.datalab.to/api/v1/marker";

/// Field in the submission response that carries the check handle.
pub const CHECK_URL_FIELD: &str = "request_check_url";

/// Per-request bound for submissions and status checks.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport used by `JobPoller`.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Submit work. Any failure here is fatal for the job.
    async fn submit(&self, payload: &ImagePayload, options: &JobOptions)
        -> Result<JobHandle, OcrError>;

    /// Fetch the current status body for a job.
    async fn check(&self, handle: &JobHandle) -> Result<Value>;
}

/// HTTP transport: multipart `POST` to submit, `GET` on the check URL to poll.
pub struct HttpJobTransport {
    client: Client,
    api_url: String,
    api_key: String,
    request_timeout: Duration,
}

impl HttpJobTransport {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, OcrError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(OcrError::Config(
                "DATALAB_API_KEY environment variable is not set and no api key was configured"
                    .to_string(),
            ));
        }
        Ok(Self {
            client: Client::new(),
            api_url: api_url.into(),
            api_key,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Check handles may be absolute URLs or tokens relative to the API URL.
    fn check_url(&self, handle: &JobHandle) -> Result<Url> {
        match Url::parse(handle.as_str()) {
            Ok(url) => Ok(url),
            Err(_) => {
                let base = Url::parse(&format!("{}/", self.api_url.trim_end_matches('/')))
                    .with_context(|| format!("invalid api url: {}", self.api_url))?;
                base.join(handle.as_str())
                    .with_context(|| format!("invalid check handle: {handle}"))
            }
        }
    }
}

#[async_trait]
impl JobTransport for HttpJobTransport {
    async fn submit(
        &self,
        payload: &ImagePayload,
        options: &JobOptions,
    ) -> Result<JobHandle, OcrError> {
        let part = Part::bytes(payload.data.to_vec())
            .file_name(payload.file_name.clone())
            .mime_str(&payload.mime_type)
            .map_err(|e| OcrError::Payload(format!("invalid mime type: {e}")))?;

        let mut form = Form::new()
            .part("file", part)
            .text("output_format", options.output_format.clone())
            .text("mode", options.mode.clone());
        for (key, value) in &options.extra {
            form = form.text(key.clone(), value.clone());
        }

        debug!(url = %self.api_url, file = %payload.file_name, "Submitting conversion job");

        let response = self
            .client
            .post(&self.api_url)
            .header("X-API-Key", &self.api_key)
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| OcrError::Submission { status: None, body: format!("{e:#}") })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(OcrError::Submission { status: Some(status.as_u16()), body });
        }

        let json: Value = serde_json::from_str(&body).map_err(|_| OcrError::Submission {
            status: Some(status.as_u16()),
            body: format!("response is not JSON: {body}"),
        })?;

        match json.get(CHECK_URL_FIELD).and_then(Value::as_str) {
            Some(check) if !check.is_empty() => Ok(JobHandle::new(check)),
            _ => Err(OcrError::Submission {
                status: Some(status.as_u16()),
                body: format!("no {CHECK_URL_FIELD} in API response: {json}"),
            }),
        }
    }

    async fn check(&self, handle: &JobHandle) -> Result<Value> {
        let url = self.check_url(handle)?;
        let response = self
            .client
            .get(url)
            .header("X-API-Key", &self.api_key)
            .timeout(self.request_timeout)
            .send()
            .await
            .context("status check request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), handle = %handle, "Status check rejected");
            bail!("status check returned {status}: {body}");
        }
        response
            .json::<Value>()
            .await
            .context("failed to parse status check response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::extract::{Multipart, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use bytes::Bytes;
    use serde_json::json;
    use tokio::net::TcpListener;

    struct Stub {
        base: String,
        checks: AtomicU32,
    }

    async fn submit_handler(
        State(stub): State<Arc<Stub>>,
        headers: HeaderMap,
        mut multipart: Multipart,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("secret") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "bad key"})));
        }
        let mut fields = Vec::new();
        while let Ok(Some(field)) = multipart.next_field().await {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let data = field.bytes().await.unwrap_or_default();
            fields.push((name, file_name, data));
        }
        let file = fields.iter().find(|(n, _, _)| n == "file");
        let mode = fields.iter().find(|(n, _, _)| n == "mode");
        match (file, mode) {
            (Some((_, Some(name), data)), Some((_, _, mode)))
                if name == "doc.pdf" && data.starts_with(b"%PDF") && mode.as_ref() == b"fast" =>
            {
                (
                    StatusCode::OK,
                    Json(json!({"success": true, CHECK_URL_FIELD: format!("{}/check/7", stub.base)})),
                )
            }
            _ => (StatusCode::BAD_REQUEST, Json(json!({"detail": "missing fields"}))),
        }
    }

    async fn check_handler(State(stub): State<Arc<Stub>>) -> Json<Value> {
        let n = stub.checks.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            Json(json!({"status": "processing"}))
        } else {
            Json(json!({"status": "complete", "markdown": "# Title"}))
        }
    }

    async fn spawn_stub() -> (String, Arc<Stub>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let stub = Arc::new(Stub { base: base.clone(), checks: AtomicU32::new(0) });
        let app = Router::new()
            .route("/marker", post(submit_handler))
            .route("/check/7", get(check_handler))
            .route("/no-handle", post(|| async { Json(json!({"success": true})) }))
            .route(
                "/check/denied",
                get(|| async { (StatusCode::NOT_FOUND, Json(json!({"detail": "unknown request"}))) }),
            )
            .route(
                "/check/stalled",
                get(|| async {
                    std::future::pending::<()>().await;
                    Json(json!({"status": "complete"}))
                }),
            )
            .with_state(Arc::clone(&stub));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (base, stub)
    }

    fn pdf() -> ImagePayload {
        ImagePayload::from_bytes("doc.pdf", Bytes::from_static(b"%PDF-1.7 test"))
    }

    fn fast() -> JobOptions {
        JobOptions { mode: "fast".into(), ..Default::default() }
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let err = HttpJobTransport::new(DEFAULT_API_URL, "  ").err().unwrap();
        assert!(matches!(err, OcrError::Config(msg) if msg.contains("DATALAB_API_KEY")));
    }

    #[test]
    fn relative_handles_resolve_against_api_url() {
        let transport = HttpJobTransport::new("https://api.test/v1/marker", "k").unwrap();
        let url = transport.check_url(&JobHandle::new("abc123")).unwrap();
        assert_eq!(url.as_str(), "https://api.test/v1/marker/abc123");
        let absolute = transport
            .check_url(&JobHandle::new("https://other.test/check/9"))
            .unwrap();
        assert_eq!(absolute.as_str(), "https://other.test/check/9");
    }

    #[tokio::test]
    async fn submit_sends_file_options_and_key() {
        let (base, stub) = spawn_stub().await;
        let transport = HttpJobTransport::new(format!("{base}/marker"), "secret").unwrap();

        let handle = transport.submit(&pdf(), &fast()).await.unwrap();
        assert_eq!(handle.as_str(), format!("{base}/check/7"));

        let first = transport.check(&handle).await.unwrap();
        assert_eq!(first["status"], "processing");
        let second = transport.check(&handle).await.unwrap();
        assert_eq!(second["markdown"], "# Title");
        assert_eq!(stub.checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_success_status_is_fatal_with_body() {
        let (base, _stub) = spawn_stub().await;
        let transport = HttpJobTransport::new(format!("{base}/marker"), "wrong").unwrap();

        let err = transport.submit(&pdf(), &fast()).await.unwrap_err();
        match err {
            OcrError::Submission { status, body } => {
                assert_eq!(status, Some(401));
                assert!(body.contains("bad key"));
            }
            other => panic!("expected submission error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_check_handle_is_fatal() {
        let (base, _stub) = spawn_stub().await;
        let transport = HttpJobTransport::new(format!("{base}/no-handle"), "secret").unwrap();

        let err = transport.submit(&pdf(), &fast()).await.unwrap_err();
        assert!(
            matches!(err, OcrError::Submission { status: Some(200), ref body } if body.contains(CHECK_URL_FIELD))
        );
    }

    #[tokio::test]
    async fn rejected_status_check_is_an_error() {
        let (base, _stub) = spawn_stub().await;
        let transport = HttpJobTransport::new(format!("{base}/marker"), "secret").unwrap();

        let err = transport.check(&JobHandle::new(format!("{base}/check/denied"))).await.unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("404"), "{text}");
        assert!(text.contains("unknown request"), "{text}");
    }

    #[tokio::test]
    async fn stalled_status_check_is_cut_off() {
        let (base, _stub) = spawn_stub().await;
        let transport = HttpJobTransport::new(format!("{base}/marker"), "secret")
            .unwrap()
            .with_request_timeout(Duration::from_millis(200));

        let handle = JobHandle::new(format!("{base}/check/stalled"));
        let check = transport.check(&handle);
        let result = tokio::time::timeout(Duration::from_secs(5), check).await;
        assert!(matches!(result, Ok(Err(_))), "check should fail within its request timeout");
    }

    #[tokio::test]
    async fn poller_gives_up_on_a_remote_that_never_answers() {
        use crate::poller::{JobPoller, PollPolicy};
        use crate::types::JobOutcome;

        let (base, _stub) = spawn_stub().await;
        let transport = HttpJobTransport::new(format!("{base}/marker"), "secret").unwrap();
        let poller = JobPoller::new(transport).with_policy(PollPolicy {
            interval: Duration::from_millis(10),
            max_polls: 2,
            check_timeout: Duration::from_millis(200),
        });

        let wait = poller.wait(JobHandle::new(format!("{base}/check/stalled")));
        let outcome = tokio::time::timeout(Duration::from_secs(5), wait).await.unwrap();
        assert!(matches!(outcome, JobOutcome::PollingTimeout { polls: 2, .. }));
    }
}
