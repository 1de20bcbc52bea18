use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{PendingFile, SessionToken, StorageLocator, PDF_MIME_TYPE},
    error::{ApiErrorBody, BackendException},
    protocol::{
        PurgeEmbeddingsQuery, QueryRequest, QueryResponse, RegisterDocumentRequest,
        RegisterDocumentResponse,
    },
};
use tokio::sync::{Mutex, Notify};

use crate::{ObjectStore, RagBackend, SessionStore};

pub fn pdf(name: &str) -> PendingFile {
    PendingFile::new(name, b"%PDF-1.7 test".to_vec(), PDF_MIME_TYPE)
}

pub fn text_file(name: &str) -> PendingFile {
    PendingFile::new(name, b"plain text".to_vec(), "text/plain")
}

pub struct TestSessionStore {
    pub token: Mutex<Option<SessionToken>>,
    pub saves: Mutex<Vec<SessionToken>>,
    fail_saves: bool,
}

impl TestSessionStore {
    pub fn empty() -> Self {
        Self {
            token: Mutex::new(None),
            saves: Mutex::new(Vec::new()),
            fail_saves: false,
        }
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(SessionToken::from(token))),
            ..Self::empty()
        }
    }

    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }
}

#[async_trait]
impl SessionStore for TestSessionStore {
    async fn load_token(&self) -> Result<Option<SessionToken>> {
        Ok(self.token.lock().await.clone())
    }

    async fn save_token(&self, token: &SessionToken) -> Result<()> {
        if self.fail_saves {
            return Err(anyhow!("disk full"));
        }
        *self.token.lock().await = Some(token.clone());
        self.saves.lock().await.push(token.clone());
        Ok(())
    }
}

pub struct TestObjectStore {
    pub writes: Mutex<Vec<(String, usize, String)>>,
    write_error: Option<String>,
    locator_error: Option<String>,
    /// When set, writes park until the gate is notified.
    pub write_gate: Option<Arc<Notify>>,
    pub write_entered: Arc<Notify>,
}

impl TestObjectStore {
    pub fn ok() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            write_error: None,
            locator_error: None,
            write_gate: None,
            write_entered: Arc::new(Notify::new()),
        }
    }

    pub fn gated_writes(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.write_gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn failing_writes(err: impl Into<String>) -> Self {
        Self {
            write_error: Some(err.into()),
            ..Self::ok()
        }
    }

    pub fn failing_locators(err: impl Into<String>) -> Self {
        Self {
            locator_error: Some(err.into()),
            ..Self::ok()
        }
    }

    pub async fn write_count(&self) -> usize {
        self.writes.lock().await.len()
    }
}

#[async_trait]
impl ObjectStore for TestObjectStore {
    async fn write(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        if let Some(gate) = &self.write_gate {
            self.write_entered.notify_one();
            gate.notified().await;
        }
        if let Some(err) = &self.write_error {
            return Err(anyhow!(err.clone()));
        }
        self.writes
            .lock()
            .await
            .push((path.to_string(), bytes.len(), content_type.to_string()));
        Ok(())
    }

    async fn resolve_public_locator(&self, path: &str) -> Result<StorageLocator> {
        if let Some(err) = &self.locator_error {
            return Err(anyhow!(err.clone()));
        }
        Ok(StorageLocator(format!("https://store.test/public/{path}")))
    }
}

pub enum RegistrationScript {
    Chunks(u64),
    Rejected { status: u16, detail: Option<String> },
    Unreachable,
}

pub struct TestBackend {
    pub registrations: Mutex<Vec<RegisterDocumentRequest>>,
    pub queries: Mutex<Vec<QueryRequest>>,
    pub resets: Mutex<Vec<SessionToken>>,
    registration: RegistrationScript,
    answer: Option<String>,
    reset_fails: bool,
    /// When set, registration parks until the gate is notified.
    pub registration_gate: Option<Arc<Notify>>,
    pub registration_entered: Arc<Notify>,
    pub query_gate: Option<Arc<Notify>>,
    pub query_entered: Arc<Notify>,
}

impl TestBackend {
    pub fn ok(chunks: u64, answer: &str) -> Self {
        Self {
            registrations: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            resets: Mutex::new(Vec::new()),
            registration: RegistrationScript::Chunks(chunks),
            answer: Some(answer.to_string()),
            reset_fails: false,
            registration_gate: None,
            registration_entered: Arc::new(Notify::new()),
            query_gate: None,
            query_entered: Arc::new(Notify::new()),
        }
    }

    pub fn with_registration(mut self, registration: RegistrationScript) -> Self {
        self.registration = registration;
        self
    }

    pub fn unreachable_queries(mut self) -> Self {
        self.answer = None;
        self
    }

    pub fn failing_resets(mut self) -> Self {
        self.reset_fails = true;
        self
    }

    pub fn gated_registration(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.registration_gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn gated_queries(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.query_gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub async fn call_count(&self) -> usize {
        self.registrations.lock().await.len()
            + self.queries.lock().await.len()
            + self.resets.lock().await.len()
    }
}

#[async_trait]
impl RagBackend for TestBackend {
    async fn register_document(
        &self,
        request: &RegisterDocumentRequest,
    ) -> Result<RegisterDocumentResponse> {
        self.registrations.lock().await.push(request.clone());
        if let Some(gate) = &self.registration_gate {
            self.registration_entered.notify_one();
            gate.notified().await;
        }
        match &self.registration {
            RegistrationScript::Chunks(chunks) => Ok(RegisterDocumentResponse {
                chunks: *chunks,
                message: Some("PDF processed".to_string()),
            }),
            RegistrationScript::Rejected { status, detail } => Err(BackendException::new(
                *status,
                detail.clone().map(ApiErrorBody::new),
            )
            .into()),
            RegistrationScript::Unreachable => Err(anyhow!("connection refused")),
        }
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        self.queries.lock().await.push(request.clone());
        if let Some(gate) = &self.query_gate {
            self.query_entered.notify_one();
            gate.notified().await;
        }
        match &self.answer {
            Some(answer) => Ok(QueryResponse {
                answer: answer.clone(),
                sources: vec![serde_json::json!({"page": 3})],
            }),
            None => Err(anyhow!("connection refused")),
        }
    }

    async fn reset_session(&self, session_id: &SessionToken) -> Result<()> {
        self.resets.lock().await.push(session_id.clone());
        if self.reset_fails {
            return Err(anyhow!("backend unavailable"));
        }
        Ok(())
    }

    async fn purge_embeddings(&self, _query: &PurgeEmbeddingsQuery) -> Result<Option<String>> {
        Ok(Some("Embeddings deleted successfully.".to_string()))
    }
}
