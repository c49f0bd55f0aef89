use std::sync::Arc;

use tokio::sync::Mutex;

use super::{Metastore, error};
use crate::model::composite::{Donor, Sample, Specimen};

/// Identity of a composite entity as the submitter sees it: study, parent
/// scope and submitter-supplied identifier. The reconciler serializes its
/// lookup-or-create on this key.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct BusinessKey {
    scope: &'static str,
    study_id: String,
    parent_id: String,
    submitter_id: String,
}

impl BusinessKey {
    #[must_use]
    pub fn donor(study_id: &str, submitter_id: &str) -> Self {
        Self {
            scope: "donor",
            study_id: study_id.to_string(),
            parent_id: study_id.to_string(),
            submitter_id: submitter_id.to_string(),
        }
    }

    #[must_use]
    pub fn specimen(study_id: &str, donor_id: &str, submitter_id: &str) -> Self {
        Self {
            scope: "specimen",
            study_id: study_id.to_string(),
            parent_id: donor_id.to_string(),
            submitter_id: submitter_id.to_string(),
        }
    }

    #[must_use]
    pub fn sample(study_id: &str, specimen_id: &str, submitter_id: &str) -> Self {
        Self {
            scope: "sample",
            study_id: study_id.to_string(),
            parent_id: specimen_id.to_string(),
            submitter_id: submitter_id.to_string(),
        }
    }
}

impl Metastore {
    /// Hands out the critical-section lock for one business key. Holding it
    /// across a lookup-or-create makes concurrent submissions of the same
    /// key observe each other's writes.
    pub fn key_lock(&self, key: &BusinessKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Prunes the lock entry for a key after its critical section ends. The
    /// entry is only removed when the map holds the sole reference; if
    /// another task still holds the `Arc`, removal would let a third task
    /// mint a fresh lock and bypass the critical section, so the entry stays
    /// until the last holder releases it.
    pub fn release_key_lock(&self, key: &BusinessKey) {
        let mut locks = self.key_locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    pub fn key_lock_count(&self) -> usize {
        self.key_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub async fn donor_by_key(&self, study_id: &str, submitter_id: &str) -> Option<Donor> {
        self.donors
            .read()
            .await
            .values()
            .find(|d| d.study_id == study_id && d.donor_submitter_id == submitter_id)
            .cloned()
    }

    pub async fn insert_donor(&self, donor: Donor) -> error::Result<Donor> {
        let mut donors = self.donors.write().await;

        let duplicate = donors
            .values()
            .any(|d| d.study_id == donor.study_id && d.donor_submitter_id == donor.donor_submitter_id);
        if duplicate {
            return Err(error::Error::DuplicateRecord {
                entity: "donor",
                field: "donor_submitter_id",
                value: donor.donor_submitter_id,
            });
        }

        donors.insert(donor.donor_id.clone(), donor.clone());

        Ok(donor)
    }

    pub async fn update_donor(&self, donor: Donor) -> error::Result<Donor> {
        let mut donors = self.donors.write().await;

        if !donors.contains_key(&donor.donor_id) {
            return Err(error::Error::not_found("donor", donor.donor_id));
        }
        donors.insert(donor.donor_id.clone(), donor.clone());

        Ok(donor)
    }

    pub async fn donor(&self, donor_id: &str) -> error::Result<Donor> {
        self.donors
            .read()
            .await
            .get(donor_id)
            .cloned()
            .ok_or_else(|| error::Error::not_found("donor", donor_id))
    }

    pub async fn specimen_by_key(
        &self,
        study_id: &str,
        donor_id: &str,
        submitter_id: &str,
    ) -> Option<Specimen> {
        self.specimens
            .read()
            .await
            .values()
            .find(|s| {
                s.study_id == study_id
                    && s.donor_id == donor_id
                    && s.specimen_submitter_id == submitter_id
            })
            .cloned()
    }

    pub async fn insert_specimen(&self, specimen: Specimen) -> error::Result<Specimen> {
        let mut specimens = self.specimens.write().await;

        let duplicate = specimens.values().any(|s| {
            s.study_id == specimen.study_id
                && s.donor_id == specimen.donor_id
                && s.specimen_submitter_id == specimen.specimen_submitter_id
        });
        if duplicate {
            return Err(error::Error::DuplicateRecord {
                entity: "specimen",
                field: "specimen_submitter_id",
                value: specimen.specimen_submitter_id,
            });
        }

        specimens.insert(specimen.specimen_id.clone(), specimen.clone());

        Ok(specimen)
    }

    pub async fn update_specimen(&self, specimen: Specimen) -> error::Result<Specimen> {
        let mut specimens = self.specimens.write().await;

        if !specimens.contains_key(&specimen.specimen_id) {
            return Err(error::Error::not_found("specimen", specimen.specimen_id));
        }
        specimens.insert(specimen.specimen_id.clone(), specimen.clone());

        Ok(specimen)
    }

    pub async fn specimen(&self, specimen_id: &str) -> error::Result<Specimen> {
        self.specimens
            .read()
            .await
            .get(specimen_id)
            .cloned()
            .ok_or_else(|| error::Error::not_found("specimen", specimen_id))
    }

    pub async fn sample_by_key(
        &self,
        study_id: &str,
        specimen_id: &str,
        submitter_id: &str,
    ) -> Option<Sample> {
        self.samples
            .read()
            .await
            .values()
            .find(|s| {
                s.study_id == study_id
                    && s.specimen_id == specimen_id
                    && s.sample_submitter_id == submitter_id
            })
            .cloned()
    }

    pub async fn insert_sample(&self, sample: Sample) -> error::Result<Sample> {
        let mut samples = self.samples.write().await;

        let duplicate = samples.values().any(|s| {
            s.study_id == sample.study_id
                && s.specimen_id == sample.specimen_id
                && s.sample_submitter_id == sample.sample_submitter_id
        });
        if duplicate {
            return Err(error::Error::DuplicateRecord {
                entity: "sample",
                field: "sample_submitter_id",
                value: sample.sample_submitter_id,
            });
        }

        samples.insert(sample.sample_id.clone(), sample.clone());

        Ok(sample)
    }

    pub async fn update_sample(&self, sample: Sample) -> error::Result<Sample> {
        let mut samples = self.samples.write().await;

        if !samples.contains_key(&sample.sample_id) {
            return Err(error::Error::not_found("sample", sample.sample_id));
        }
        samples.insert(sample.sample_id.clone(), sample.clone());

        Ok(sample)
    }

    pub async fn sample(&self, sample_id: &str) -> error::Result<Sample> {
        self.samples
            .read()
            .await
            .get(sample_id)
            .cloned()
            .ok_or_else(|| error::Error::not_found("sample", sample_id))
    }

    pub async fn donor_count(&self) -> usize {
        self.donors.read().await.len()
    }

    pub async fn specimen_count(&self) -> usize {
        self.specimens.read().await.len()
    }

    pub async fn sample_count(&self) -> usize {
        self.samples.read().await.len()
    }
}
