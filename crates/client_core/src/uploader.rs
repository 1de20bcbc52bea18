use std::sync::Arc;

use shared::domain::{PendingFile, SessionToken, StorageLocator, PDF_MIME_TYPE};
use tracing::{error, info};
use uuid::Uuid;

use crate::{error::ClientError, ObjectStore};

/// Top-level folder every session's documents are written under.
pub const STORAGE_ROOT: &str = "pdfs";

pub fn storage_path_for(session: &SessionToken, object_id: &Uuid) -> String {
    format!("{STORAGE_ROOT}/{session}/{object_id}.pdf")
}

pub fn validate_file(file: &PendingFile) -> Result<(), ClientError> {
    if file.mime_type != PDF_MIME_TYPE {
        return Err(ClientError::InvalidFileType {
            mime_type: file.mime_type.clone(),
        });
    }
    Ok(())
}

/// Writes validated PDFs to the object store and resolves their public locator.
pub struct ObjectUploader {
    store: Arc<dyn ObjectStore>,
}

impl ObjectUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn upload(
        &self,
        file: &PendingFile,
        session: &SessionToken,
    ) -> Result<StorageLocator, ClientError> {
        validate_file(file)?;

        let path = storage_path_for(session, &Uuid::new_v4());
        self.store
            .write(&path, &file.bytes, PDF_MIME_TYPE)
            .await
            .map_err(|err| {
                error!("upload: write failed file={} path={path}: {err:#}", file.name);
                ClientError::StorageWriteFailed(format!("{err:#}"))
            })?;

        let locator = self
            .store
            .resolve_public_locator(&path)
            .await
            .map_err(|err| {
                error!("upload: locator unavailable path={path}: {err:#}");
                ClientError::LocatorUnavailable(format!("{err:#}"))
            })?;
        if locator.as_str().trim().is_empty() {
            return Err(ClientError::LocatorUnavailable(format!(
                "empty locator for '{path}'"
            )));
        }

        info!(
            "upload: stored file={} bytes={} path={path}",
            file.name,
            file.size_bytes()
        );
        Ok(locator)
    }
}

#[cfg(test)]
#[path = "tests/uploader_tests.rs"]
mod tests;
