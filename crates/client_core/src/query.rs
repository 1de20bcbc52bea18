use std::sync::Arc;

use serde_json::Value;
use shared::{domain::SessionToken, protocol::QueryRequest};
use tracing::{debug, warn};

use crate::{error::ClientError, RagBackend};

pub const FALLBACK_ANSWER: &str =
    "Sorry, I couldn't connect to the server. Please try again later.";

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Value>,
    /// Set when the backend could not be reached and `text` is the canned fallback.
    pub fallback: bool,
}

impl Answer {
    fn fallback() -> Self {
        Self {
            text: FALLBACK_ANSWER.to_string(),
            sources: Vec::new(),
            fallback: true,
        }
    }
}

/// Relays one natural-language query per call to the backend.
pub struct QueryExchange {
    backend: Arc<dyn RagBackend>,
}

impl QueryExchange {
    pub fn new(backend: Arc<dyn RagBackend>) -> Self {
        Self { backend }
    }

    /// Returns `None` without contacting the backend when `query_text` is blank.
    /// Transport failures are recovered into the fallback answer.
    pub async fn ask(&self, query_text: &str, session: &SessionToken) -> Option<Answer> {
        let query = query_text.trim();
        if query.is_empty() {
            debug!("query: dropped empty query session={session}");
            return None;
        }

        let request = QueryRequest {
            query: query.to_string(),
            session_id: session.clone(),
        };
        match self.backend.query(&request).await {
            Ok(response) => Some(Answer {
                text: response.answer,
                sources: response.sources,
                fallback: false,
            }),
            Err(err) => {
                let failure = ClientError::QueryTransportFailed(format!("{err:#}"));
                warn!("query: {failure} session={session}");
                Some(Answer::fallback())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
