use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error payload returned by the document backend, e.g. `{"detail": "Session ID is required."}`.
///
/// Validation failures carry a structured `detail` (a list of field errors) instead of a string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ApiErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(Value::String(detail.into())),
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
#[error("backend responded with status {status}: {}", .reason.as_deref().unwrap_or("no detail"))]
pub struct BackendException {
    pub status: u16,
    pub reason: Option<String>,
}

impl BackendException {
    pub fn new(status: u16, body: Option<ApiErrorBody>) -> Self {
        Self {
            status,
            reason: body.and_then(|body| body.reason()),
        }
    }
}
