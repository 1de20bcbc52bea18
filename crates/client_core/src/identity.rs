use std::sync::Arc;

use shared::domain::SessionToken;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{error::ClientError, RagBackend, SessionStore};

/// Outcome of a completed identity reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReset {
    pub previous: Option<SessionToken>,
    pub current: SessionToken,
    /// Whether the backend acknowledged teardown of `previous`.
    pub teardown_acknowledged: bool,
}

/// Owns the lifetime of the opaque session token.
pub struct SessionIdentity {
    store: Arc<dyn SessionStore>,
    backend: Arc<dyn RagBackend>,
    current: Mutex<Option<SessionToken>>,
}

impl SessionIdentity {
    pub fn new(store: Arc<dyn SessionStore>, backend: Arc<dyn RagBackend>) -> Self {
        Self {
            store,
            backend,
            current: Mutex::new(None),
        }
    }

    pub async fn current(&self) -> Option<SessionToken> {
        self.current.lock().await.clone()
    }

    pub async fn get_or_create(&self) -> Result<SessionToken, ClientError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            return Ok(token.clone());
        }

        let token = match self
            .store
            .load_token()
            .await
            .map_err(ClientError::session_store)?
        {
            Some(token) => {
                info!("session: restored persisted token session={token}");
                token
            }
            None => {
                let token = SessionToken::generate();
                self.store
                    .save_token(&token)
                    .await
                    .map_err(ClientError::session_store)?;
                info!("session: created token session={token}");
                token
            }
        };

        *current = Some(token.clone());
        Ok(token)
    }

    /// Tears down the current session and switches to a fresh token.
    ///
    /// The backend notification is best-effort. The new token is persisted before it becomes
    /// current, so a storage failure leaves the client on its previous token.
    pub async fn reset(&self) -> Result<SessionReset, ClientError> {
        let mut current = self.current.lock().await;
        let previous = match current.clone() {
            Some(token) => Some(token),
            None => self
                .store
                .load_token()
                .await
                .map_err(ClientError::session_store)?,
        };

        let teardown_acknowledged = match &previous {
            Some(token) => self.notify_teardown(token).await,
            None => false,
        };

        let next = SessionToken::generate();
        self.store
            .save_token(&next)
            .await
            .map_err(ClientError::session_store)?;
        *current = Some(next.clone());

        info!(
            "session: reset previous={} current={next} teardown_acknowledged={teardown_acknowledged}",
            previous.as_ref().map(SessionToken::as_str).unwrap_or("none")
        );
        Ok(SessionReset {
            previous,
            current: next,
            teardown_acknowledged,
        })
    }

    async fn notify_teardown(&self, token: &SessionToken) -> bool {
        match self.backend.reset_session(token).await {
            Ok(()) => true,
            Err(err) => {
                let failure = ClientError::SessionResetNotificationFailed(format!("{err:#}"));
                warn!("session: {failure} session={token}");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
