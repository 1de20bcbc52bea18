//! Two-phase document ingestion: object store upload, then backend registration.
//!
//! Each session runs its own state machine:
//! Idle -> Uploading -> Registering -> Ready/Failed -> Idle
//! Uploading -> Failed

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use shared::{
    domain::{PendingFile, SessionToken, StorageLocator},
    error::BackendException,
    protocol::RegisterDocumentRequest,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

use crate::{
    error::ClientError,
    uploader::{validate_file, ObjectUploader},
    ClientEvent, RagBackend,
};

/// Used when the backend rejects a registration without saying why.
pub const GENERIC_REGISTRATION_FAILURE: &str =
    "The server could not process the document. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestionPhase {
    Idle,
    Uploading,
    Registering,
    Ready,
    Failed,
}

impl IngestionPhase {
    pub fn is_in_flight(self) -> bool {
        matches!(self, IngestionPhase::Uploading | IngestionPhase::Registering)
    }
}

pub fn validate_transition(from: IngestionPhase, to: IngestionPhase) -> Result<(), ClientError> {
    use IngestionPhase::*;

    let valid = matches!(
        (from, to),
        (Idle, Uploading)
            | (Uploading, Registering)
            | (Uploading, Failed)
            | (Registering, Ready)
            | (Registering, Failed)
            | (Ready, Idle)
            | (Failed, Idle)
    );

    if valid {
        Ok(())
    } else {
        Err(ClientError::InvalidTransition { from, to })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub file_name: String,
    pub locator: StorageLocator,
    pub chunk_count: u64,
}

pub struct IngestionOrchestrator {
    uploader: ObjectUploader,
    backend: Arc<dyn RagBackend>,
    phases: Mutex<HashMap<SessionToken, IngestionPhase>>,
    /// Sessions torn down by a reset; nothing is registered under them afterwards.
    superseded: Mutex<HashSet<SessionToken>>,
    events: broadcast::Sender<ClientEvent>,
}

impl IngestionOrchestrator {
    pub fn new(
        uploader: ObjectUploader,
        backend: Arc<dyn RagBackend>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            uploader,
            backend,
            phases: Mutex::new(HashMap::new()),
            superseded: Mutex::new(HashSet::new()),
            events,
        }
    }

    pub async fn phase(&self, session: &SessionToken) -> IngestionPhase {
        self.phases
            .lock()
            .await
            .get(session)
            .copied()
            .unwrap_or(IngestionPhase::Idle)
    }

    /// Stops any in-flight ingestion for `session` from reaching the backend.
    pub async fn supersede(&self, session: &SessionToken) {
        self.superseded.lock().await.insert(session.clone());
    }

    /// Undoes [`Self::supersede`] when the reset that called it did not complete.
    pub async fn reinstate(&self, session: &SessionToken) {
        self.superseded.lock().await.remove(session);
    }

    pub async fn is_superseded(&self, session: &SessionToken) -> bool {
        self.superseded.lock().await.contains(session)
    }

    pub async fn ingest(
        &self,
        file: &PendingFile,
        session: &SessionToken,
    ) -> Result<IngestionReport, ClientError> {
        validate_file(file)?;
        if self.is_superseded(session).await {
            return Err(ClientError::SessionSuperseded(session.clone()));
        }
        self.begin(session).await?;

        let outcome = self.run(file, session).await;
        let terminal = match &outcome {
            Ok(_) => IngestionPhase::Ready,
            Err(_) => IngestionPhase::Failed,
        };
        let settled = match self.transition(session, terminal).await {
            Ok(()) => self.transition(session, IngestionPhase::Idle).await,
            Err(err) => Err(err),
        };
        if let Err(err) = settled {
            error!("ingest: {err} session={session}");
        }
        self.phases.lock().await.remove(session);

        match &outcome {
            Ok(report) => info!(
                "ingest: ready session={session} file={} chunks={}",
                report.file_name, report.chunk_count
            ),
            Err(err) => warn!("ingest: failed session={session} file={}: {err}", file.name),
        }
        outcome
    }

    async fn begin(&self, session: &SessionToken) -> Result<(), ClientError> {
        {
            let mut phases = self.phases.lock().await;
            let current = phases
                .get(session)
                .copied()
                .unwrap_or(IngestionPhase::Idle);
            if current.is_in_flight() {
                return Err(ClientError::IngestionBusy);
            }
            validate_transition(current, IngestionPhase::Uploading)?;
            phases.insert(session.clone(), IngestionPhase::Uploading);
        }
        self.publish(session, IngestionPhase::Uploading);
        Ok(())
    }

    async fn run(
        &self,
        file: &PendingFile,
        session: &SessionToken,
    ) -> Result<IngestionReport, ClientError> {
        let locator = self.uploader.upload(file, session).await?;
        if self.is_superseded(session).await {
            return Err(ClientError::SessionSuperseded(session.clone()));
        }

        self.transition(session, IngestionPhase::Registering)
            .await?;
        let request = RegisterDocumentRequest {
            session_id: session.clone(),
            file_url: locator.clone(),
        };
        let response = self
            .backend
            .register_document(&request)
            .await
            .map_err(registration_failure)?;

        Ok(IngestionReport {
            file_name: file.name.clone(),
            locator,
            chunk_count: response.chunks,
        })
    }

    async fn transition(
        &self,
        session: &SessionToken,
        next: IngestionPhase,
    ) -> Result<(), ClientError> {
        {
            let mut phases = self.phases.lock().await;
            let current = phases
                .get(session)
                .copied()
                .unwrap_or(IngestionPhase::Idle);
            validate_transition(current, next)?;
            phases.insert(session.clone(), next);
        }
        self.publish(session, next);
        Ok(())
    }

    fn publish(&self, session: &SessionToken, phase: IngestionPhase) {
        let _ = self.events.send(ClientEvent::IngestionPhaseChanged {
            session: session.clone(),
            phase,
        });
    }
}

fn registration_failure(err: anyhow::Error) -> ClientError {
    error!("ingest: registration failed: {err:#}");
    let reason = err
        .downcast_ref::<BackendException>()
        .and_then(|exception| exception.reason.clone())
        .unwrap_or_else(|| GENERIC_REGISTRATION_FAILURE.to_string());
    ClientError::BackendRegistrationFailed(reason)
}

#[cfg(test)]
#[path = "tests/ingestion_tests.rs"]
mod tests;
