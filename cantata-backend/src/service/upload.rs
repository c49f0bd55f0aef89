use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use super::{
    analysis::AnalysisOrchestrator,
    error::{Error, Result},
    validation::PayloadValidator,
};
use crate::{
    db::{Metastore, error::Error as StoreError},
    id::{IdGenerator, IdPrefix},
    model::{
        analysis::AnalysisPayload,
        upload::{Upload, UploadState},
    },
};

/// Owns the upload lifecycle: receipt of raw payloads, the asynchronous
/// validation handoff, and the commit that turns a validated upload into an
/// analysis.
pub struct UploadService {
    store: Arc<Metastore>,
    ids: Arc<IdGenerator>,
    validator: Arc<PayloadValidator>,
    analyses: Arc<AnalysisOrchestrator>,
}

impl UploadService {
    #[must_use]
    pub fn new(
        store: Arc<Metastore>,
        ids: Arc<IdGenerator>,
        validator: Arc<PayloadValidator>,
        analyses: Arc<AnalysisOrchestrator>,
    ) -> Self {
        Self {
            store,
            ids,
            validator,
            analyses,
        }
    }

    /// Accepts a raw payload for a study and schedules its validation. The
    /// returned identifier is handed back immediately; clients poll `status`
    /// for the outcome.
    pub async fn receive(&self, study_id: &str, payload: String) -> Result<String> {
        // Study codes are case-insensitive; the stored form is upper-cased.
        let study_id = study_id.to_uppercase();
        self.store.study(&study_id).await?;

        if payload.trim().is_empty() {
            return Err(Error::MalformedPayload {
                message: "payload must not be empty".to_string(),
            });
        }

        let upload_id = self.ids.next(IdPrefix::Upload);
        self.store
            .insert_upload(Upload::new(upload_id.clone(), study_id.clone(), payload))
            .await?;

        self.validator.dispatch(upload_id.clone());

        tracing::info!(study_id, upload_id, "upload received");

        Ok(upload_id)
    }

    /// Current state of an upload, scoped to its study.
    pub async fn status(&self, study_id: &str, upload_id: &str) -> Result<Upload> {
        let upload = self.store.upload(upload_id).await?;

        if !upload.study_id.eq_ignore_ascii_case(study_id) {
            return Err(StoreError::not_found("upload", upload_id).into());
        }

        Ok(upload)
    }

    /// Commits a validated upload, creating the analysis it described. The
    /// upload table stays locked for the whole transition, so of any number
    /// of racing commits exactly one observes `Validated` and wins; the rest
    /// fail with an invalid-state error.
    pub async fn commit(&self, study_id: &str, upload_id: &str) -> Result<String> {
        let mut uploads = self.store.lock_uploads().await;

        let upload = uploads
            .get_mut(upload_id)
            .filter(|upload| upload.study_id.eq_ignore_ascii_case(study_id))
            .ok_or_else(|| StoreError::not_found("upload", upload_id))?;

        if upload.state != UploadState::Validated {
            return Err(Error::InvalidState {
                entity: "upload",
                id: upload_id.to_string(),
                required: UploadState::Validated.to_string(),
                actual: upload.state.to_string(),
            });
        }

        let payload = parse_payload(&upload.payload)?;
        let study_id = upload.study_id.clone();
        let analysis_id = self
            .analyses
            .create(&study_id, upload.analysis_type_version, payload)
            .await?;

        upload.state = UploadState::Saved;
        upload.errors.clear();
        upload.updated_at = Utc::now();

        tracing::info!(study_id, upload_id, analysis_id, "upload committed");

        Ok(analysis_id)
    }
}

/// A validated payload should always parse, but the raw text is what is
/// stored, so the commit path re-parses defensibly. An unrecognized
/// analysis type gets its own error; anything else is a malformed payload.
fn parse_payload(raw: &str) -> Result<AnalysisPayload> {
    match serde_json::from_str(raw) {
        Ok(payload) => Ok(payload),
        Err(err) => {
            let declared = serde_json::from_str::<Value>(raw).ok().and_then(|document| {
                document
                    .pointer("/analysisType")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });

            match declared {
                Some(name) => Err(Error::InvalidAnalysisType { name }),
                None => Err(Error::MalformedPayload {
                    message: err.to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    use crate::{
        model::upload::UploadState,
        service::{
            error::Error,
            test_util::{STUDY_ID, TestContext, ctx, sequencing_read_payload, sequencing_read_schema},
        },
    };

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn valid_upload_reaches_validated(#[future] ctx: TestContext) {
        let upload_id = ctx
            .uploads
            .receive(STUDY_ID, sequencing_read_payload("OBJ1").to_string())
            .await
            .unwrap();
        ctx.validator.process(&upload_id).await.unwrap();

        let upload = ctx.uploads.status(STUDY_ID, &upload_id).await.unwrap();

        assert_eq!(upload.state, UploadState::Validated);
        assert_eq!(upload.analysis_type_version, Some(1));
        assert!(upload.errors.is_empty());
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn failed_validation_keeps_the_upload_created(#[future] ctx: TestContext) {
        let mut payload = sequencing_read_payload("OBJ1");
        payload["experiment"]
            .as_object_mut()
            .unwrap()
            .remove("alignmentTool");

        let upload_id = ctx
            .uploads
            .receive(STUDY_ID, payload.to_string())
            .await
            .unwrap();
        ctx.validator.process(&upload_id).await.unwrap();

        let upload = ctx.uploads.status(STUDY_ID, &upload_id).await.unwrap();

        assert_eq!(upload.state, UploadState::Created);
        assert!(upload.errors.iter().any(|e| e.contains("alignmentTool")));

        let err = ctx.uploads.commit(STUDY_ID, &upload_id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn commit_requires_a_validated_upload(#[future] ctx: TestContext) {
        let upload_id = ctx
            .uploads
            .receive(STUDY_ID, sequencing_read_payload("OBJ1").to_string())
            .await
            .unwrap();

        // Validation has not run yet.
        let err = ctx.uploads.commit(STUDY_ID, &upload_id).await.unwrap_err();
        assert_eq!(
            err,
            Error::InvalidState {
                entity: "upload",
                id: upload_id,
                required: "VALIDATED".to_string(),
                actual: "CREATED".to_string(),
            }
        );
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn commit_creates_the_analysis_and_saves_the_upload(#[future] ctx: TestContext) {
        let upload_id = ctx
            .uploads
            .receive(STUDY_ID, sequencing_read_payload("OBJ1").to_string())
            .await
            .unwrap();
        ctx.validator.process(&upload_id).await.unwrap();

        let analysis_id = ctx.uploads.commit(STUDY_ID, &upload_id).await.unwrap();

        let upload = ctx.uploads.status(STUDY_ID, &upload_id).await.unwrap();
        assert_eq!(upload.state, UploadState::Saved);

        let analysis = ctx.analyses.read(&analysis_id).await.unwrap();
        assert_eq!(analysis.study_id, STUDY_ID);
        assert_eq!(analysis.analysis_type.version, 1);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn racing_commits_have_exactly_one_winner(#[future] ctx: TestContext) {
        let upload_id = ctx
            .uploads
            .receive(STUDY_ID, sequencing_read_payload("OBJ1").to_string())
            .await
            .unwrap();
        ctx.validator.process(&upload_id).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let uploads = Arc::clone(&ctx.uploads);
                let upload_id = upload_id.clone();
                tokio::spawn(async move { uploads.commit(STUDY_ID, &upload_id).await })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => winners += 1,
                Err(err) => assert!(matches!(err, Error::InvalidState { .. })),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(ctx.store.analysis_count().await, 1);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn late_validation_callback_cannot_demote_a_saved_upload(#[future] ctx: TestContext) {
        let upload_id = ctx
            .uploads
            .receive(STUDY_ID, sequencing_read_payload("OBJ1").to_string())
            .await
            .unwrap();
        ctx.validator.process(&upload_id).await.unwrap();
        ctx.uploads.commit(STUDY_ID, &upload_id).await.unwrap();

        // A duplicate callback, as a delayed task might deliver.
        ctx.validator.process(&upload_id).await.unwrap();

        let upload = ctx.uploads.status(STUDY_ID, &upload_id).await.unwrap();
        assert_eq!(upload.state, UploadState::Saved);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn study_codes_are_case_insensitive_across_the_upload_flow(#[future] ctx: TestContext) {
        // The study was created as ABC123; every step addresses it in a
        // different casing.
        let upload_id = ctx
            .uploads
            .receive("abc123", sequencing_read_payload("OBJ1").to_string())
            .await
            .unwrap();
        ctx.validator.process(&upload_id).await.unwrap();

        let upload = ctx.uploads.status("Abc123", &upload_id).await.unwrap();
        assert_eq!(upload.study_id, STUDY_ID);
        assert_eq!(upload.state, UploadState::Validated);

        let analysis_id = ctx.uploads.commit("aBC123", &upload_id).await.unwrap();
        let analysis = ctx.analyses.read(&analysis_id).await.unwrap();
        assert_eq!(analysis.study_id, STUDY_ID);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn failed_commit_leaves_no_orphaned_analysis(#[future] ctx: TestContext) {
        let upload_id = ctx
            .uploads
            .receive(STUDY_ID, sequencing_read_payload("OBJ1").to_string())
            .await
            .unwrap();
        ctx.validator.process(&upload_id).await.unwrap();

        // The pinned schema version disappears between validation and commit.
        ctx.store.delete_schema("sequencingRead", 1).await.unwrap();

        let err = ctx.uploads.commit(STUDY_ID, &upload_id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Store(crate::db::error::Error::SchemaNotFound { .. })
        ));

        // No half-written analysis header, and the upload is still committable.
        assert_eq!(ctx.store.analysis_count().await, 0);
        let upload = ctx.uploads.status(STUDY_ID, &upload_id).await.unwrap();
        assert_eq!(upload.state, UploadState::Validated);

        ctx.store
            .register_schema("sequencingRead", sequencing_read_schema())
            .await
            .unwrap();

        // The retry reuses the entities the failed attempt reconciled.
        ctx.uploads.commit(STUDY_ID, &upload_id).await.unwrap();
        assert_eq!(ctx.store.analysis_count().await, 1);
        assert_eq!(ctx.store.sample_count().await, 1);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn blank_payloads_are_rejected_on_receipt(#[future] ctx: TestContext) {
        let err = ctx
            .uploads
            .receive(STUDY_ID, "   ".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn uploads_are_scoped_to_their_study(#[future] ctx: TestContext) {
        ctx.store
            .insert_study(crate::model::study::Study::from_request(
                crate::model::study::NewStudy {
                    study_id: "OTHER1".to_string(),
                    name: "Other".to_string(),
                    description: String::new(),
                    organization: String::new(),
                },
            ))
            .await
            .unwrap();

        let upload_id = ctx
            .uploads
            .receive(STUDY_ID, json!({"analysisType": "sequencingRead"}).to_string())
            .await
            .unwrap();

        let err = ctx.uploads.status("OTHER1", &upload_id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Store(crate::db::error::Error::RecordNotFound { .. })
        ));
    }
}
