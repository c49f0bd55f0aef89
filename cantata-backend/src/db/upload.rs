use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLockWriteGuard;

use super::{Metastore, error};
use crate::model::upload::{Upload, UploadState};

impl Metastore {
    pub async fn insert_upload(&self, upload: Upload) -> error::Result<Upload> {
        let mut uploads = self.uploads.write().await;

        if uploads.contains_key(&upload.upload_id) {
            return Err(error::Error::DuplicateRecord {
                entity: "upload",
                field: "upload_id",
                value: upload.upload_id,
            });
        }

        uploads.insert(upload.upload_id.clone(), upload.clone());

        Ok(upload)
    }

    pub async fn upload(&self, upload_id: &str) -> error::Result<Upload> {
        self.uploads
            .read()
            .await
            .get(upload_id)
            .cloned()
            .ok_or_else(|| error::Error::not_found("upload", upload_id))
    }

    /// Validation callback for a successful outcome. Only a pending upload
    /// moves to `Validated`; a callback landing after a commit is a no-op.
    pub async fn record_validation_success(
        &self,
        upload_id: &str,
        analysis_type_version: u32,
    ) -> error::Result<()> {
        let mut uploads = self.uploads.write().await;

        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| error::Error::not_found("upload", upload_id))?;

        if upload.state == UploadState::Created {
            upload.state = UploadState::Validated;
            upload.errors.clear();
            upload.analysis_type_version = Some(analysis_type_version);
            upload.updated_at = Utc::now();
        }

        Ok(())
    }

    /// Validation callback for a failed outcome: the upload stays `Created`
    /// with its violation list populated.
    pub async fn record_validation_failure(
        &self,
        upload_id: &str,
        violations: Vec<String>,
    ) -> error::Result<()> {
        let mut uploads = self.uploads.write().await;

        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| error::Error::not_found("upload", upload_id))?;

        if upload.state == UploadState::Created {
            upload.errors = violations;
            upload.updated_at = Utc::now();
        }

        Ok(())
    }

    /// Exclusive access to the upload table for the commit critical section.
    /// Holding the guard across the whole VALIDATED→SAVED transition is what
    /// serializes racing commits: exactly one caller observes `Validated`.
    pub(crate) async fn lock_uploads(&self) -> RwLockWriteGuard<'_, HashMap<String, Upload>> {
        self.uploads.write().await
    }
}
