use shared::domain::SessionToken;
use thiserror::Error;

use crate::ingestion::IngestionPhase;
use crate::query::FALLBACK_ANSWER;

/// Failures of the session orchestration layer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid file type '{mime_type}': only application/pdf is accepted")]
    InvalidFileType { mime_type: String },
    #[error("failed to write file to object store: {0}")]
    StorageWriteFailed(String),
    #[error("uploaded file has no public locator: {0}")]
    LocatorUnavailable(String),
    #[error("an ingestion is already running for this session")]
    IngestionBusy,
    #[error("backend rejected document registration: {0}")]
    BackendRegistrationFailed(String),
    #[error("query transport failed: {0}")]
    QueryTransportFailed(String),
    #[error("session reset notification failed: {0}")]
    SessionResetNotificationFailed(String),
    #[error("a query is already outstanding for this session")]
    QueryBusy,
    #[error("session {0} was reset before the operation completed")]
    SessionSuperseded(SessionToken),
    #[error("session storage failure: {0}")]
    SessionStore(String),
    #[error("no session has been established yet")]
    SessionNotInitialized,
    #[error("invalid ingestion transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: IngestionPhase,
        to: IngestionPhase,
    },
}

impl ClientError {
    /// Plain-language text appended to the conversation when this failure ends an operation.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::InvalidFileType { .. } => {
                "Invalid file type. Only PDF files are allowed.".to_string()
            }
            ClientError::StorageWriteFailed(_) => {
                "Failed to upload the PDF to storage. Please try again.".to_string()
            }
            ClientError::LocatorUnavailable(_) => {
                "The PDF was stored but no public link could be created for it. Please try again."
                    .to_string()
            }
            ClientError::IngestionBusy => {
                "A document is already being processed. Please wait for it to finish.".to_string()
            }
            ClientError::BackendRegistrationFailed(reason) => {
                format!("I couldn't process that document: {reason}")
            }
            ClientError::QueryTransportFailed(_) => FALLBACK_ANSWER.to_string(),
            ClientError::SessionResetNotificationFailed(_) => {
                "The server could not be told about the reset, but a new session was started."
                    .to_string()
            }
            ClientError::QueryBusy => {
                "Please wait for the current answer before asking another question.".to_string()
            }
            ClientError::SessionSuperseded(_) => {
                "That request belonged to a previous session and was discarded.".to_string()
            }
            ClientError::SessionStore(_) => {
                "Your session could not be saved on this device. Please try again.".to_string()
            }
            ClientError::SessionNotInitialized => {
                "The session is still starting. Please try again in a moment.".to_string()
            }
            ClientError::InvalidTransition { .. } => {
                "Something went wrong while processing the document. Please try again."
                    .to_string()
            }
        }
    }

    pub(crate) fn session_store(err: anyhow::Error) -> Self {
        ClientError::SessionStore(format!("{err:#}"))
    }
}
