use std::sync::Arc;

use shared::domain::{ConversationEntry, PendingFile, SessionToken, ViewState};
use tokio::sync::{broadcast, Mutex};
use tracing::info;

use crate::{
    error::ClientError,
    identity::SessionIdentity,
    ingestion::{IngestionOrchestrator, IngestionPhase, IngestionReport},
    query::{Answer, QueryExchange},
    uploader::ObjectUploader,
    ClientEvent, ObjectStore, RagBackend, SessionStore,
};

pub const INITIAL_GREETING: &str = "Hello! How can I help you with your documents today?";
pub const RESET_GREETING: &str = "Session has been reset. Please upload new documents.";

const EVENT_CAPACITY: usize = 256;

struct ControllerState {
    session: Option<SessionToken>,
    view: ViewState,
    conversation: Vec<ConversationEntry>,
    querying: bool,
}

/// Entry point for the presentation layer.
///
/// Every result that resolves after a reset is compared against the current token and dropped
/// when it belongs to an older session.
pub struct SessionController {
    identity: SessionIdentity,
    ingestion: IngestionOrchestrator,
    exchange: QueryExchange,
    state: Mutex<ControllerState>,
    events: broadcast::Sender<ClientEvent>,
}

impl SessionController {
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        object_store: Arc<dyn ObjectStore>,
        backend: Arc<dyn RagBackend>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            identity: SessionIdentity::new(session_store, Arc::clone(&backend)),
            ingestion: IngestionOrchestrator::new(
                ObjectUploader::new(object_store),
                Arc::clone(&backend),
                events.clone(),
            ),
            exchange: QueryExchange::new(backend),
            state: Mutex::new(ControllerState {
                session: None,
                view: ViewState::Upload,
                conversation: Vec::new(),
                querying: false,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Restores or creates the session token and seeds the conversation.
    pub async fn initialize(&self) -> Result<SessionToken, ClientError> {
        let token = self.identity.get_or_create().await?;
        let mut state = self.state.lock().await;
        state.session = Some(token.clone());
        if state.conversation.is_empty() {
            let greeting = ConversationEntry::assistant(INITIAL_GREETING);
            state.conversation.push(greeting.clone());
            self.emit(ClientEvent::EntryAppended(greeting));
        }
        self.emit(ClientEvent::SessionEstablished(token.clone()));
        Ok(token)
    }

    pub async fn session_token(&self) -> Option<SessionToken> {
        self.state.lock().await.session.clone()
    }

    pub async fn view(&self) -> ViewState {
        self.state.lock().await.view
    }

    pub async fn conversation(&self) -> Vec<ConversationEntry> {
        self.state.lock().await.conversation.clone()
    }

    pub async fn is_querying(&self) -> bool {
        self.state.lock().await.querying
    }

    pub async fn is_uploading(&self) -> bool {
        match self.session_token().await {
            Some(session) => self.ingestion.phase(&session).await.is_in_flight(),
            None => false,
        }
    }

    pub async fn ingestion_phase(&self) -> IngestionPhase {
        match self.session_token().await {
            Some(session) => self.ingestion.phase(&session).await,
            None => IngestionPhase::Idle,
        }
    }

    /// Starts a fresh session. The old token is superseded before the backend is told to tear
    /// it down, so an upload still in flight never registers under it.
    pub async fn reset(&self) -> Result<SessionToken, ClientError> {
        let previous = self.session_token().await;
        if let Some(previous) = &previous {
            self.ingestion.supersede(previous).await;
        }

        let outcome = match self.identity.reset().await {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Some(previous) = &previous {
                    self.ingestion.reinstate(previous).await;
                }
                let entry = ConversationEntry::assistant(err.user_message());
                self.state.lock().await.conversation.push(entry.clone());
                self.emit(ClientEvent::EntryAppended(entry));
                return Err(err);
            }
        };

        let mut state = self.state.lock().await;
        state.session = Some(outcome.current.clone());
        state.view = ViewState::Upload;
        state.querying = false;
        state.conversation = vec![ConversationEntry::assistant(RESET_GREETING)];
        drop(state);

        self.emit(ClientEvent::SessionReset {
            previous: outcome.previous,
            current: outcome.current.clone(),
        });
        self.emit(ClientEvent::ViewChanged(ViewState::Upload));
        Ok(outcome.current)
    }

    /// Ingests `file` into the current session; switches to the chat view only on success.
    pub async fn upload(&self, file: PendingFile) -> Result<IngestionReport, ClientError> {
        let session = self.require_session().await?;
        let outcome = self.ingestion.ingest(&file, &session).await;

        let mut state = self.state.lock().await;
        if state.session.as_ref() != Some(&session) {
            drop(state);
            return Err(self.discard_stale(session, "upload"));
        }

        match outcome {
            Ok(report) => {
                let entry = ConversationEntry::assistant(ready_message(&report));
                state.view = ViewState::Chat;
                state.conversation.push(entry.clone());
                drop(state);
                self.emit(ClientEvent::ViewChanged(ViewState::Chat));
                self.emit(ClientEvent::EntryAppended(entry));
                Ok(report)
            }
            Err(err) => {
                let entry = ConversationEntry::assistant(err.user_message());
                state.conversation.push(entry.clone());
                drop(state);
                self.emit(ClientEvent::EntryAppended(entry));
                Err(err)
            }
        }
    }

    /// Sends `text` as a query. Blank text is a no-op returning `Ok(None)`.
    pub async fn ask(&self, text: &str) -> Result<Option<Answer>, ClientError> {
        let query = text.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let session = {
            let mut state = self.state.lock().await;
            let session = state
                .session
                .clone()
                .ok_or(ClientError::SessionNotInitialized)?;
            if state.querying {
                return Err(ClientError::QueryBusy);
            }
            state.querying = true;
            let entry = ConversationEntry::user(query);
            state.conversation.push(entry.clone());
            self.emit(ClientEvent::EntryAppended(entry));
            session
        };

        let answer = self.exchange.ask(query, &session).await;

        let mut state = self.state.lock().await;
        if state.session.as_ref() != Some(&session) {
            drop(state);
            return Err(self.discard_stale(session, "query"));
        }
        state.querying = false;
        let Some(answer) = answer else {
            return Ok(None);
        };
        let entry = ConversationEntry::assistant(answer.text.clone());
        state.conversation.push(entry.clone());
        drop(state);
        self.emit(ClientEvent::EntryAppended(entry));
        Ok(Some(answer))
    }

    async fn require_session(&self) -> Result<SessionToken, ClientError> {
        self.state
            .lock()
            .await
            .session
            .clone()
            .ok_or(ClientError::SessionNotInitialized)
    }

    fn discard_stale(&self, session: SessionToken, operation: &'static str) -> ClientError {
        info!("session: discarded stale {operation} result session={session}");
        self.emit(ClientEvent::StaleResultDiscarded {
            session: session.clone(),
            operation,
        });
        ClientError::SessionSuperseded(session)
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

fn ready_message(report: &IngestionReport) -> String {
    let unit = if report.chunk_count == 1 {
        "chunk"
    } else {
        "chunks"
    };
    format!(
        "{} is ready: indexed {} {unit}. Ask me anything about it.",
        report.file_name, report.chunk_count
    )
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
