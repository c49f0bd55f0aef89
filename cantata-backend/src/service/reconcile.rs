use std::sync::Arc;

use super::error;
use crate::{
    db::{BusinessKey, Metastore, error::Error as StoreError},
    id::{IdGenerator, IdPrefix},
    model::composite::{
        Donor, Sample, Specimen, SubmittedDonor, SubmittedSample, SubmittedSpecimen,
    },
};

/// Turns a denormalized donor → specimen → sample subtree into deduplicated
/// rows, keyed on business identifiers. Each level is a lookup-or-create
/// held under that key's critical section, so concurrent submissions of the
/// same key resolve to the same system identifier. Descriptive fields merge
/// by overwrite; last write wins.
pub struct CompositeEntityReconciler {
    store: Arc<Metastore>,
    ids: Arc<IdGenerator>,
}

impl CompositeEntityReconciler {
    #[must_use]
    pub fn new(store: Arc<Metastore>, ids: Arc<IdGenerator>) -> Self {
        Self { store, ids }
    }

    /// Reconciles one subtree and returns the leaf sample row.
    pub async fn reconcile(
        &self,
        study_id: &str,
        submitted: &SubmittedSample,
    ) -> error::Result<Sample> {
        let donor = self.reconcile_donor(study_id, &submitted.donor).await?;
        let specimen = self
            .reconcile_specimen(study_id, &donor.donor_id, &submitted.specimen)
            .await?;

        self.reconcile_sample(study_id, &specimen.specimen_id, submitted)
            .await
    }

    async fn reconcile_donor(
        &self,
        study_id: &str,
        submitted: &SubmittedDonor,
    ) -> error::Result<Donor> {
        let key = BusinessKey::donor(study_id, &submitted.donor_submitter_id);
        let lock = self.store.key_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.donor_under_lock(study_id, submitted).await
        };
        // Both the guard and this task's handle are gone, so the entry can
        // be pruned once no other task holds it.
        drop(lock);
        self.store.release_key_lock(&key);

        result
    }

    async fn donor_under_lock(
        &self,
        study_id: &str,
        submitted: &SubmittedDonor,
    ) -> error::Result<Donor> {
        if let Some(mut existing) = self
            .store
            .donor_by_key(study_id, &submitted.donor_submitter_id)
            .await
        {
            if submitted.donor_gender.is_some() && submitted.donor_gender != existing.donor_gender
            {
                existing.donor_gender.clone_from(&submitted.donor_gender);
                return Ok(self.store.update_donor(existing).await?);
            }
            return Ok(existing);
        }

        let donor = Donor {
            donor_id: self.ids.next(IdPrefix::Donor),
            study_id: study_id.to_string(),
            donor_submitter_id: submitted.donor_submitter_id.clone(),
            donor_gender: submitted.donor_gender.clone(),
        };

        match self.store.insert_donor(donor).await {
            Ok(created) => Ok(created),
            // A racing creator won despite the key lock; reuse its row.
            Err(StoreError::DuplicateRecord { .. }) => Ok(self
                .store
                .donor_by_key(study_id, &submitted.donor_submitter_id)
                .await
                .ok_or_else(|| StoreError::not_found("donor", &submitted.donor_submitter_id))?),
            Err(err) => Err(err.into()),
        }
    }

    async fn reconcile_specimen(
        &self,
        study_id: &str,
        donor_id: &str,
        submitted: &SubmittedSpecimen,
    ) -> error::Result<Specimen> {
        let key = BusinessKey::specimen(study_id, donor_id, &submitted.specimen_submitter_id);
        let lock = self.store.key_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.specimen_under_lock(study_id, donor_id, submitted).await
        };
        drop(lock);
        self.store.release_key_lock(&key);

        result
    }

    async fn specimen_under_lock(
        &self,
        study_id: &str,
        donor_id: &str,
        submitted: &SubmittedSpecimen,
    ) -> error::Result<Specimen> {
        if let Some(mut existing) = self
            .store
            .specimen_by_key(study_id, donor_id, &submitted.specimen_submitter_id)
            .await
        {
            let mut changed = false;
            if submitted.specimen_class.is_some()
                && submitted.specimen_class != existing.specimen_class
            {
                existing.specimen_class.clone_from(&submitted.specimen_class);
                changed = true;
            }
            if submitted.specimen_type.is_some()
                && submitted.specimen_type != existing.specimen_type
            {
                existing.specimen_type.clone_from(&submitted.specimen_type);
                changed = true;
            }
            if changed {
                return Ok(self.store.update_specimen(existing).await?);
            }
            return Ok(existing);
        }

        let specimen = Specimen {
            specimen_id: self.ids.next(IdPrefix::Specimen),
            study_id: study_id.to_string(),
            donor_id: donor_id.to_string(),
            specimen_submitter_id: submitted.specimen_submitter_id.clone(),
            specimen_class: submitted.specimen_class.clone(),
            specimen_type: submitted.specimen_type.clone(),
        };

        match self.store.insert_specimen(specimen).await {
            Ok(created) => Ok(created),
            Err(StoreError::DuplicateRecord { .. }) => Ok(self
                .store
                .specimen_by_key(study_id, donor_id, &submitted.specimen_submitter_id)
                .await
                .ok_or_else(|| {
                    StoreError::not_found("specimen", &submitted.specimen_submitter_id)
                })?),
            Err(err) => Err(err.into()),
        }
    }

    async fn reconcile_sample(
        &self,
        study_id: &str,
        specimen_id: &str,
        submitted: &SubmittedSample,
    ) -> error::Result<Sample> {
        let key = BusinessKey::sample(study_id, specimen_id, &submitted.sample_submitter_id);
        let lock = self.store.key_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.sample_under_lock(study_id, specimen_id, submitted).await
        };
        drop(lock);
        self.store.release_key_lock(&key);

        result
    }

    async fn sample_under_lock(
        &self,
        study_id: &str,
        specimen_id: &str,
        submitted: &SubmittedSample,
    ) -> error::Result<Sample> {
        if let Some(mut existing) = self
            .store
            .sample_by_key(study_id, specimen_id, &submitted.sample_submitter_id)
            .await
        {
            if submitted.sample_type.is_some() && submitted.sample_type != existing.sample_type {
                existing.sample_type.clone_from(&submitted.sample_type);
                return Ok(self.store.update_sample(existing).await?);
            }
            return Ok(existing);
        }

        let sample = Sample {
            sample_id: self.ids.next(IdPrefix::Sample),
            study_id: study_id.to_string(),
            specimen_id: specimen_id.to_string(),
            sample_submitter_id: submitted.sample_submitter_id.clone(),
            sample_type: submitted.sample_type.clone(),
        };

        match self.store.insert_sample(sample).await {
            Ok(created) => Ok(created),
            Err(StoreError::DuplicateRecord { .. }) => Ok(self
                .store
                .sample_by_key(study_id, specimen_id, &submitted.sample_submitter_id)
                .await
                .ok_or_else(|| {
                    StoreError::not_found("sample", &submitted.sample_submitter_id)
                })?),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::CompositeEntityReconciler;
    use crate::{
        model::composite::{SubmittedDonor, SubmittedSample, SubmittedSpecimen},
        service::test_util::{STUDY_ID, TestContext, ctx},
    };

    fn subtree(donor: &str, specimen: &str, sample: &str) -> SubmittedSample {
        SubmittedSample {
            sample_submitter_id: sample.to_string(),
            sample_type: Some("DNA".to_string()),
            donor: SubmittedDonor {
                donor_submitter_id: donor.to_string(),
                donor_gender: Some("male".to_string()),
            },
            specimen: SubmittedSpecimen {
                specimen_submitter_id: specimen.to_string(),
                specimen_class: Some("Normal".to_string()),
                specimen_type: None,
            },
        }
    }

    fn reconciler(ctx: &TestContext) -> CompositeEntityReconciler {
        CompositeEntityReconciler::new(Arc::clone(&ctx.store), Arc::clone(&ctx.ids))
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn identical_resubmission_is_idempotent(#[future] ctx: TestContext) {
        let reconciler = reconciler(&ctx);
        let submitted = subtree("D1", "SP1", "SA1");

        let first = reconciler.reconcile(STUDY_ID, &submitted).await.unwrap();
        let second = reconciler.reconcile(STUDY_ID, &submitted).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(ctx.store.donor_count().await, 1);
        assert_eq!(ctx.store.specimen_count().await, 1);
        assert_eq!(ctx.store.sample_count().await, 1);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn shared_ancestors_are_reused_across_subtrees(#[future] ctx: TestContext) {
        let reconciler = reconciler(&ctx);

        let first = reconciler
            .reconcile(STUDY_ID, &subtree("D1", "SP1", "SA1"))
            .await
            .unwrap();
        let second = reconciler
            .reconcile(STUDY_ID, &subtree("D1", "SP1", "SA2"))
            .await
            .unwrap();

        assert_ne!(first.sample_id, second.sample_id);
        assert_eq!(first.specimen_id, second.specimen_id);
        assert_eq!(ctx.store.donor_count().await, 1);
        assert_eq!(ctx.store.specimen_count().await, 1);
        assert_eq!(ctx.store.sample_count().await, 2);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn descriptive_fields_merge_by_overwrite(#[future] ctx: TestContext) {
        let reconciler = reconciler(&ctx);

        reconciler
            .reconcile(STUDY_ID, &subtree("D1", "SP1", "SA1"))
            .await
            .unwrap();

        let mut resubmitted = subtree("D1", "SP1", "SA1");
        resubmitted.donor.donor_gender = Some("female".to_string());
        resubmitted.specimen.specimen_type = Some("Primary tumour".to_string());
        reconciler.reconcile(STUDY_ID, &resubmitted).await.unwrap();

        let donor = ctx.store.donor_by_key(STUDY_ID, "D1").await.unwrap();
        assert_eq!(donor.donor_gender.as_deref(), Some("female"));

        let specimen = ctx
            .store
            .specimen_by_key(STUDY_ID, &donor.donor_id, "SP1")
            .await
            .unwrap();
        assert_eq!(specimen.specimen_type.as_deref(), Some("Primary tumour"));
        // Fields absent from the resubmission are left alone.
        assert_eq!(specimen.specimen_class.as_deref(), Some("Normal"));
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn concurrent_submissions_of_one_key_create_one_row(#[future] ctx: TestContext) {
        let reconciler = Arc::new(reconciler(&ctx));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let reconciler = Arc::clone(&reconciler);
                tokio::spawn(async move {
                    reconciler
                        .reconcile(STUDY_ID, &subtree("D1", "SP1", "SA1"))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut sample_ids = Vec::new();
        for task in tasks {
            sample_ids.push(task.await.unwrap().sample_id);
        }

        sample_ids.dedup();
        assert_eq!(sample_ids.len(), 1);
        assert_eq!(ctx.store.donor_count().await, 1);
        assert_eq!(ctx.store.specimen_count().await, 1);
        assert_eq!(ctx.store.sample_count().await, 1);
        // Once every task has finished, no lock entries linger.
        assert_eq!(ctx.store.key_lock_count(), 0);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn key_locks_are_pruned_after_reconciliation(#[future] ctx: TestContext) {
        let reconciler = reconciler(&ctx);

        for sample in ["SA1", "SA2", "SA3"] {
            reconciler
                .reconcile(STUDY_ID, &subtree("D1", "SP1", sample))
                .await
                .unwrap();
        }

        // The lock map serves the critical sections only; it does not grow
        // with the number of keys ever reconciled.
        assert_eq!(ctx.store.key_lock_count(), 0);
    }
}
