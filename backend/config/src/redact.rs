//! Config redaction: produce safe-to-share config snapshots by masking sensitive fields.

use serde_json::Value;

static SENSITIVE_KEYS: &[&str] = &["apiKey", "api_key", "token", "secret", "password"];

/// Redact a config JSON value, masking secrets as their first 4 chars + `***`.
pub fn redact(value: &Value) -> Value {
    redact_recursive(value, "")
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn redact_recursive(value: &Value, key: &str) -> Value {
    match value {
        Value::String(s) if is_sensitive_key(key) && !s.is_empty() => {
            let hint: String = s.chars().take(4).collect();
            if s.chars().count() > 8 {
                Value::String(format!("{hint}***"))
            } else {
                Value::String("***".to_string())
            }
        }
        Value::Array(arr) => Value::Array(arr.iter().map(|v| redact_recursive(v, key)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), redact_recursive(v, k)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_nested_api_keys() {
        let v = json!({"backend": {"apiKey": "sk-abcdef123456"}, "jobs": {"apiKey": "short"}});
        let redacted = redact(&v);
        assert_eq!(redacted["backend"]["apiKey"], "sk-a***");
        assert_eq!(redacted["jobs"]["apiKey"], "***");
    }

    #[test]
    fn passthrough_non_sensitive() {
        let v = json!({"logging": {"level": "debug"}, "dispatch": {"strategyOrder": ["path_only"]}});
        assert_eq!(redact(&v), v);
    }
}
