//! Log Redaction Layer
//!
//! Scrubs API keys and access tokens out of strings before they are logged
//! or returned to a client.

use std::sync::LazyLock;

use regex::Regex;

static API_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sk-[a-zA-Z0-9_\-]{20,}").unwrap());
static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Bearer\s+[a-zA-Z0-9\-\._~+/]+=*").unwrap());
static KEY_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)((?:x-api-key|api[_-]?key|access_token|[?&]key)["']?\s*[:=]\s*["']?)[^\s"'&,}]+"#)
        .unwrap()
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = BEARER_RE.replace_all(input, "Bearer [REDACTED_TOKEN]");
    let redacted = API_KEY_RE.replace_all(&redacted, "[REDACTED_TOKEN]");
    KEY_FIELD_RE
        .replace_all(&redacted, "${1}[REDACTED_TOKEN]")
        .into_owned()
}
