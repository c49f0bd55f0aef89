use std::{collections::HashMap, sync::Arc};

use futures::future::try_join_all;

use super::{
    error::{Error, Result},
    existence::ExistenceChecker,
    reconcile::CompositeEntityReconciler,
};
use crate::{
    db::Metastore,
    id::{IdGenerator, IdPrefix},
    model::{
        analysis::{Analysis, AnalysisPayload, AnalysisRecord, AnalysisState, AnalysisTypeRef},
        composite::CompositeEntity,
        file::File,
    },
};

/// Coordinates what happens when an upload is committed and afterwards:
/// composite-entity reconciliation, file registration, assembly of the
/// denormalized view, and the publish/suppress transitions.
pub struct AnalysisOrchestrator {
    store: Arc<Metastore>,
    ids: Arc<IdGenerator>,
    reconciler: CompositeEntityReconciler,
    existence: Arc<ExistenceChecker>,
}

impl AnalysisOrchestrator {
    #[must_use]
    pub fn new(
        store: Arc<Metastore>,
        ids: Arc<IdGenerator>,
        reconciler: CompositeEntityReconciler,
        existence: Arc<ExistenceChecker>,
    ) -> Self {
        Self {
            store,
            ids,
            reconciler,
            existence,
        }
    }

    /// Persists a validated payload as a new analysis: reconciled entity
    /// subtrees, schema provenance, header row and the file set, in that
    /// order. Reconciliation is idempotent, so a commit that fails partway
    /// leaves no header behind and a retry reuses the same entities instead
    /// of minting duplicates. When `analysis_type_version` is absent the
    /// latest registered version is recorded.
    pub async fn create(
        &self,
        study_id: &str,
        analysis_type_version: Option<u32>,
        payload: AnalysisPayload,
    ) -> Result<String> {
        let study_id = study_id.to_uppercase();
        self.store.study(&study_id).await?;

        let type_name = payload.experiment.type_name();
        let version = match analysis_type_version {
            Some(version) => version,
            None => self.store.resolve_schema(type_name, None).await?.version,
        };

        let (sample_ids, samples_by_submitter) =
            self.reconcile_samples(&study_id, &payload).await?;

        let analysis_id = self.ids.next(IdPrefix::Analysis);
        self.store
            .attach_analysis_to_schema(type_name, version, &analysis_id)
            .await?;
        self.store
            .insert_analysis(AnalysisRecord {
                analysis_id: analysis_id.clone(),
                study_id: study_id.clone(),
                analysis_type: AnalysisTypeRef {
                    name: type_name.to_string(),
                    version,
                },
                analysis_state: AnalysisState::Unpublished,
                experiment: payload.experiment.clone(),
                sample_ids,
                file_ids: Vec::new(),
            })
            .await?;

        let files = self.build_files(&study_id, &analysis_id, &payload, &samples_by_submitter);
        self.store.replace_files(&analysis_id, files).await?;

        tracing::info!(study_id, analysis_id, analysis_type = type_name, "analysis created");

        Ok(analysis_id)
    }

    /// Re-runs reconciliation and file replacement for an existing analysis.
    /// The analysis state is left untouched.
    pub async fn update(
        &self,
        study_id: &str,
        analysis_id: &str,
        payload: AnalysisPayload,
    ) -> Result<()> {
        let study_id = study_id.to_uppercase();
        let mut record = self.store.analysis(analysis_id).await?;

        if record.study_id != study_id {
            return Err(crate::db::error::Error::not_found("analysis", analysis_id).into());
        }
        if payload.experiment.type_name() != record.analysis_type.name {
            return Err(Error::InvalidAnalysisType {
                name: payload.experiment.type_name().to_string(),
            });
        }

        let (sample_ids, samples_by_submitter) =
            self.reconcile_samples(&study_id, &payload).await?;

        record.experiment = payload.experiment.clone();
        record.sample_ids = sample_ids;
        self.store.update_analysis(record).await?;

        let files = self.build_files(&study_id, analysis_id, &payload, &samples_by_submitter);
        self.store.replace_files(analysis_id, files).await?;

        tracing::info!(study_id, analysis_id, "analysis updated");

        Ok(())
    }

    /// Assembles the full denormalized view from normalized storage.
    pub async fn read(&self, analysis_id: &str) -> Result<Analysis> {
        let record = self.store.analysis(analysis_id).await?;

        let mut sample = Vec::with_capacity(record.sample_ids.len());
        for sample_id in &record.sample_ids {
            let row = self.store.sample(sample_id).await?;
            let specimen = self.store.specimen(&row.specimen_id).await?;
            let donor = self.store.donor(&specimen.donor_id).await?;

            sample.push(CompositeEntity {
                sample: row,
                specimen,
                donor,
            });
        }

        let file = self.store.files_for_analysis(analysis_id).await?;

        Ok(Analysis {
            analysis_id: record.analysis_id,
            study_id: record.study_id,
            analysis_type: record.analysis_type,
            analysis_state: record.analysis_state,
            experiment: record.experiment,
            sample,
            file,
        })
    }

    /// Publishes an analysis once every owned file is confirmed present in
    /// external storage. The checks run concurrently but the transition only
    /// happens after the complete set has landed; failures enumerate every
    /// missing object. A suppressed analysis cannot be published.
    pub async fn publish(&self, access_token: Option<&str>, analysis_id: &str) -> Result<()> {
        let record = self.store.analysis(analysis_id).await?;

        if record.analysis_state == AnalysisState::Suppressed {
            return Err(Error::InvalidState {
                entity: "analysis",
                id: analysis_id.to_string(),
                required: AnalysisState::Unpublished.to_string(),
                actual: record.analysis_state.to_string(),
            });
        }

        let files = self.store.files_for_analysis(analysis_id).await?;
        let checks = files.iter().map(|file| {
            let object_id = file.object_id.clone();
            async move {
                let present = self.existence.is_present(access_token, &object_id).await?;
                Ok::<_, Error>((object_id, present))
            }
        });

        let missing: Vec<String> = try_join_all(checks)
            .await?
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(object_id, _)| object_id)
            .collect();

        if !missing.is_empty() {
            return Err(Error::UnpublishedFiles {
                analysis_id: analysis_id.to_string(),
                missing,
            });
        }

        // The transition re-checks the state under the table lock, so a
        // suppression that landed while the checks ran is not overwritten.
        let state = self.store.mark_analysis_published(analysis_id).await?;
        if state == AnalysisState::Suppressed {
            return Err(Error::InvalidState {
                entity: "analysis",
                id: analysis_id.to_string(),
                required: AnalysisState::Unpublished.to_string(),
                actual: state.to_string(),
            });
        }

        tracing::info!(analysis_id, "analysis published");

        Ok(())
    }

    /// Withdraws an analysis. Always allowed, regardless of current state;
    /// the data stays in storage for audit.
    pub async fn suppress(&self, analysis_id: &str) -> Result<()> {
        self.store
            .set_analysis_state(analysis_id, AnalysisState::Suppressed)
            .await?;

        tracing::info!(analysis_id, "analysis suppressed");

        Ok(())
    }

    /// Reconciles the submitted subtrees, returning the leaf sample ids in
    /// submission order plus the submitter-id lookup used to attach files.
    async fn reconcile_samples(
        &self,
        study_id: &str,
        payload: &AnalysisPayload,
    ) -> Result<(Vec<String>, HashMap<String, String>)> {
        let mut sample_ids = Vec::with_capacity(payload.sample.len());
        let mut samples_by_submitter = HashMap::new();

        for submitted in &payload.sample {
            let sample = self.reconciler.reconcile(study_id, submitted).await?;
            samples_by_submitter
                .insert(sample.sample_submitter_id.clone(), sample.sample_id.clone());
            sample_ids.push(sample.sample_id);
        }

        Ok((sample_ids, samples_by_submitter))
    }

    fn build_files(
        &self,
        study_id: &str,
        analysis_id: &str,
        payload: &AnalysisPayload,
        samples_by_submitter: &HashMap<String, String>,
    ) -> Vec<File> {
        payload
            .file
            .iter()
            .map(|submitted| {
                let file_id = self.ids.next(IdPrefix::File);
                let object_id = submitted.object_id.clone().unwrap_or_else(|| file_id.clone());
                let sample_id = submitted
                    .sample_submitter_id
                    .as_ref()
                    .and_then(|submitter| samples_by_submitter.get(submitter).cloned());

                File {
                    file_id,
                    analysis_id: analysis_id.to_string(),
                    study_id: study_id.to_string(),
                    sample_id,
                    file_name: submitted.file_name.clone(),
                    file_size: submitted.file_size,
                    file_type: submitted.file_type.clone(),
                    file_access: submitted.file_access,
                    object_id,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{
        model::analysis::{AnalysisPayload, AnalysisState, Experiment},
        service::{
            error::Error,
            test_util::{STUDY_ID, TestContext, ctx, sequencing_read_payload},
        },
    };

    fn payload(object_id: &str) -> AnalysisPayload {
        serde_json::from_value(sequencing_read_payload(object_id)).unwrap()
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn read_reproduces_the_created_document(#[future] ctx: TestContext) {
        let submitted = payload("OBJ1");
        let analysis_id = ctx
            .analyses
            .create(STUDY_ID, Some(1), submitted.clone())
            .await
            .unwrap();

        let analysis = ctx.analyses.read(&analysis_id).await.unwrap();

        assert_eq!(analysis.analysis_state, AnalysisState::Unpublished);
        assert_eq!(analysis.analysis_type.name, "sequencingRead");
        assert_eq!(analysis.analysis_type.version, 1);
        assert_eq!(analysis.experiment, submitted.experiment);

        assert_eq!(analysis.sample.len(), 1);
        let entity = &analysis.sample[0];
        assert_eq!(entity.sample.sample_submitter_id, "sample-1");
        assert_eq!(entity.specimen.specimen_submitter_id, "specimen-1");
        assert_eq!(entity.donor.donor_submitter_id, "donor-1");
        assert_eq!(entity.donor.donor_gender.as_deref(), Some("female"));

        assert_eq!(analysis.file.len(), 1);
        let file = &analysis.file[0];
        assert_eq!(file.file_name, "reads.bam");
        assert_eq!(file.object_id, "OBJ1");
        assert_eq!(file.sample_id.as_deref(), Some(entity.sample.sample_id.as_str()));
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn update_replaces_files_and_keeps_state(#[future] ctx: TestContext) {
        let analysis_id = ctx
            .analyses
            .create(STUDY_ID, Some(1), payload("OBJ1"))
            .await
            .unwrap();

        ctx.analyses
            .update(STUDY_ID, &analysis_id, payload("OBJ2"))
            .await
            .unwrap();

        let analysis = ctx.analyses.read(&analysis_id).await.unwrap();
        assert_eq!(analysis.analysis_state, AnalysisState::Unpublished);
        assert_eq!(analysis.file.len(), 1);
        assert_eq!(analysis.file[0].object_id, "OBJ2");
        // The identical subtree reconciled to the same rows.
        assert_eq!(ctx.store.sample_count().await, 1);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn update_rejects_a_different_experiment_variant(#[future] ctx: TestContext) {
        let analysis_id = ctx
            .analyses
            .create(STUDY_ID, Some(1), payload("OBJ1"))
            .await
            .unwrap();

        let mut switched = payload("OBJ1");
        switched.experiment = Experiment::VariantCall {
            variant_calling_tool: Some("GATK".to_string()),
            matched_normal_sample_submitter_id: None,
        };

        let err = ctx
            .analyses
            .update(STUDY_ID, &analysis_id, switched)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            Error::InvalidAnalysisType {
                name: "variantCall".to_string()
            }
        );
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn publish_is_atomic_over_the_file_set(#[future] ctx: TestContext) {
        let mut submitted = payload("OBJ-PRESENT");
        submitted.file.push(crate::model::file::SubmittedFile {
            file_name: "variants.vcf".to_string(),
            file_size: 2048,
            file_type: Some("VCF".to_string()),
            file_access: crate::model::file::FileAccess::Open,
            object_id: Some("OBJ-ABSENT".to_string()),
            sample_submitter_id: None,
        });

        let analysis_id = ctx
            .analyses
            .create(STUDY_ID, Some(1), submitted)
            .await
            .unwrap();
        ctx.existence.mark_present("OBJ-PRESENT").await.unwrap();

        let err = ctx.analyses.publish(None, &analysis_id).await.unwrap_err();
        assert_eq!(
            err,
            Error::UnpublishedFiles {
                analysis_id: analysis_id.clone(),
                missing: vec!["OBJ-ABSENT".to_string()],
            }
        );
        let analysis = ctx.analyses.read(&analysis_id).await.unwrap();
        assert_eq!(analysis.analysis_state, AnalysisState::Unpublished);

        ctx.existence.mark_present("OBJ-ABSENT").await.unwrap();
        ctx.analyses.publish(None, &analysis_id).await.unwrap();

        let analysis = ctx.analyses.read(&analysis_id).await.unwrap();
        assert_eq!(analysis.analysis_state, AnalysisState::Published);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn suppress_is_unconditional_and_blocks_publish(#[future] ctx: TestContext) {
        let analysis_id = ctx
            .analyses
            .create(STUDY_ID, Some(1), payload("OBJ1"))
            .await
            .unwrap();
        ctx.existence.mark_present("OBJ1").await.unwrap();

        ctx.analyses.publish(None, &analysis_id).await.unwrap();
        ctx.analyses.suppress(&analysis_id).await.unwrap();

        let analysis = ctx.analyses.read(&analysis_id).await.unwrap();
        assert_eq!(analysis.analysis_state, AnalysisState::Suppressed);

        let err = ctx.analyses.publish(None, &analysis_id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn suppression_during_publish_checks_wins(#[future] ctx: TestContext) {
        let analysis_id = ctx
            .analyses
            .create(STUDY_ID, Some(1), payload("OBJ1"))
            .await
            .unwrap();

        // A suppression that lands after publish has passed its own state
        // check but before the transition commits.
        ctx.store
            .set_analysis_state(&analysis_id, AnalysisState::Suppressed)
            .await
            .unwrap();

        let state = ctx.store.mark_analysis_published(&analysis_id).await.unwrap();
        assert_eq!(state, AnalysisState::Suppressed);

        let analysis = ctx.analyses.read(&analysis_id).await.unwrap();
        assert_eq!(analysis.analysis_state, AnalysisState::Suppressed);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn create_requires_an_existing_study(#[future] ctx: TestContext) {
        let err = ctx
            .analyses
            .create("NOPE", Some(1), payload("OBJ1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Store(crate::db::error::Error::RecordNotFound { .. })
        ));
    }
}
