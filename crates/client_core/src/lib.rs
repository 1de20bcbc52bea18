use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ConversationEntry, SessionToken, StorageLocator, ViewState},
    protocol::{
        PurgeEmbeddingsQuery, QueryRequest, QueryResponse, RegisterDocumentRequest,
        RegisterDocumentResponse,
    },
};
use storage::Storage;

pub mod controller;
pub mod error;
pub mod identity;
pub mod ingestion;
pub mod query;
pub mod transport;
pub mod uploader;

pub use controller::SessionController;
pub use error::ClientError;
pub use identity::{SessionIdentity, SessionReset};
pub use ingestion::{IngestionOrchestrator, IngestionPhase, IngestionReport};
pub use query::{Answer, QueryExchange, FALLBACK_ANSWER};
pub use transport::{HttpObjectStore, HttpRagBackend};
pub use uploader::ObjectUploader;

/// Durable external storage for uploaded document bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn write(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()>;
    async fn resolve_public_locator(&self, path: &str) -> Result<StorageLocator>;
}

pub struct MissingObjectStore;

#[async_trait]
impl ObjectStore for MissingObjectStore {
    async fn write(&self, path: &str, _bytes: &[u8], _content_type: &str) -> Result<()> {
        Err(anyhow!("object store is not configured; cannot write '{path}'"))
    }

    async fn resolve_public_locator(&self, path: &str) -> Result<StorageLocator> {
        Err(anyhow!(
            "object store is not configured; no public locator for '{path}'"
        ))
    }
}

/// Request/response contract of the document processing backend.
#[async_trait]
pub trait RagBackend: Send + Sync {
    async fn register_document(
        &self,
        request: &RegisterDocumentRequest,
    ) -> Result<RegisterDocumentResponse>;
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse>;
    async fn reset_session(&self, session_id: &SessionToken) -> Result<()>;
    async fn purge_embeddings(&self, query: &PurgeEmbeddingsQuery) -> Result<Option<String>>;
}

pub struct MissingRagBackend;

#[async_trait]
impl RagBackend for MissingRagBackend {
    async fn register_document(
        &self,
        _request: &RegisterDocumentRequest,
    ) -> Result<RegisterDocumentResponse> {
        Err(anyhow!("document backend is not configured"))
    }

    async fn query(&self, _request: &QueryRequest) -> Result<QueryResponse> {
        Err(anyhow!("document backend is not configured"))
    }

    async fn reset_session(&self, session_id: &SessionToken) -> Result<()> {
        Err(anyhow!(
            "document backend is not configured; cannot reset session {session_id}"
        ))
    }

    async fn purge_embeddings(&self, _query: &PurgeEmbeddingsQuery) -> Result<Option<String>> {
        Err(anyhow!("document backend is not configured"))
    }
}

/// Single-key durable storage for the live session token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_token(&self) -> Result<Option<SessionToken>>;
    async fn save_token(&self, token: &SessionToken) -> Result<()>;
}

#[async_trait]
impl SessionStore for Storage {
    async fn load_token(&self) -> Result<Option<SessionToken>> {
        self.load_session_token().await
    }

    async fn save_token(&self, token: &SessionToken) -> Result<()> {
        self.save_session_token(token).await
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    SessionEstablished(SessionToken),
    SessionReset {
        previous: Option<SessionToken>,
        current: SessionToken,
    },
    IngestionPhaseChanged {
        session: SessionToken,
        phase: IngestionPhase,
    },
    ViewChanged(ViewState),
    EntryAppended(ConversationEntry),
    StaleResultDiscarded {
        session: SessionToken,
        operation: &'static str,
    },
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
