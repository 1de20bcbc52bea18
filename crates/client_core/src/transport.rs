//! reqwest-backed implementations of the object store and document backend contracts.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::{SessionToken, StorageLocator},
    error::{ApiErrorBody, BackendException},
    protocol::{
        MessageResponse, PurgeEmbeddingsQuery, QueryRequest, QueryResponse,
        RegisterDocumentRequest, RegisterDocumentResponse, ResetSessionRequest,
    },
};
use tracing::debug;
use url::Url;

use crate::{ObjectStore, RagBackend};

pub const DEFAULT_BUCKET: &str = "pdfs";

/// Object store speaking the Supabase Storage REST dialect.
pub struct HttpObjectStore {
    http: Client,
    base_url: String,
    bucket: String,
    api_key: Option<String>,
}

impl HttpObjectStore {
    pub fn new(
        base_url: &str,
        bucket: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        Self::with_client(Client::new(), base_url, bucket, api_key)
    }

    pub fn with_client(
        http: Client,
        base_url: &str,
        bucket: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .with_context(|| format!("invalid object store url '{base_url}'"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("object store url must be http(s): '{base_url}'");
        }
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn write(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let mut request = self
            .http
            .post(self.object_url(path))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        let res = request
            .send()
            .await
            .with_context(|| format!("failed to reach object store for '{path}'"))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            bail!("object store rejected '{path}' with status {status}: {body}");
        }
        debug!("storage: wrote path={path} bytes={}", bytes.len());
        Ok(())
    }

    async fn resolve_public_locator(&self, path: &str) -> Result<StorageLocator> {
        let raw = format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        );
        let url = Url::parse(&raw).with_context(|| format!("invalid public url '{raw}'"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("public url is not http(s): '{url}'"));
        }
        Ok(StorageLocator(url.to_string()))
    }
}

/// Client for the document processing backend's `/api` routes.
pub struct HttpRagBackend {
    http: Client,
    base_url: String,
}

impl HttpRagBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}/api/{route}", self.base_url)
    }
}

#[async_trait]
impl RagBackend for HttpRagBackend {
    async fn register_document(
        &self,
        request: &RegisterDocumentRequest,
    ) -> Result<RegisterDocumentResponse> {
        let res = self
            .http
            .post(self.endpoint("upload"))
            .json(request)
            .send()
            .await
            .context("failed to reach document backend")?;
        let res = ensure_success(res).await?;
        res.json()
            .await
            .context("malformed document registration response")
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let res = self
            .http
            .post(self.endpoint("chat"))
            .form(request)
            .send()
            .await
            .context("failed to reach document backend")?;
        let res = ensure_success(res).await?;
        res.json().await.context("malformed chat response")
    }

    async fn reset_session(&self, session_id: &SessionToken) -> Result<()> {
        let res = self
            .http
            .post(self.endpoint("reset"))
            .form(&ResetSessionRequest {
                session_id: session_id.clone(),
            })
            .send()
            .await
            .context("failed to reach document backend")?;
        ensure_success(res).await?;
        Ok(())
    }

    async fn purge_embeddings(&self, query: &PurgeEmbeddingsQuery) -> Result<Option<String>> {
        if !query.has_selector() {
            bail!("either a session id or a cutoff timestamp is required to purge embeddings");
        }
        let res = self
            .http
            .post(self.endpoint("delete-embeddings"))
            .query(query)
            .send()
            .await
            .context("failed to reach document backend")?;
        let res = ensure_success(res).await?;
        let body: MessageResponse = res.json().await.unwrap_or_default();
        Ok(body.message)
    }
}

async fn ensure_success(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.json::<ApiErrorBody>().await.ok();
    Err(BackendException::new(status.as_u16(), body).into())
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
