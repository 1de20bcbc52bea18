use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{SessionToken, StorageLocator};

/// Body of `POST /api/upload`: asks the backend to fetch and index an uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDocumentRequest {
    pub session_id: SessionToken,
    pub file_url: StorageLocator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDocumentResponse {
    pub chunks: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Form fields of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub session_id: SessionToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Value>,
}

/// Form fields of `POST /api/reset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetSessionRequest {
    pub session_id: SessionToken,
}

/// Query string of `POST /api/delete-embeddings`; at least one selector must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurgeEmbeddingsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
}

impl PurgeEmbeddingsQuery {
    pub fn for_session(session_id: SessionToken) -> Self {
        Self {
            session_id: Some(session_id),
            before: None,
        }
    }

    pub fn older_than(before: DateTime<Utc>) -> Self {
        Self {
            session_id: None,
            before: Some(before),
        }
    }

    pub fn has_selector(&self) -> bool {
        self.session_id.is_some() || self.before.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}
