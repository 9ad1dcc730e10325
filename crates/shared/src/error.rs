use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
    Upstream,
    Unavailable,
    Internal,
}

/// Error body returned by the gateway and understood by the dashboard.
///
/// Backends behind the gateway also reply with a bare `{"error": "..."}` on
/// an otherwise successful response, so `code` is optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: Some(code),
        }
    }
}

/// Returns the application-level error marker carried by a JSON body.
///
/// Only a non-null `error` member counts. Strings are returned as-is, other
/// JSON values are rendered compactly.
pub fn error_marker(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Extracts a human-readable error from a failed response body.
///
/// Checks `error` first, then `detail` (the shape upstream services use for
/// HTTP exceptions).
pub fn error_description(body: &Value) -> Option<String> {
    if let Some(marker) = error_marker(body) {
        return Some(marker);
    }
    match body.get("detail")? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    }
}
