use super::{Metastore, error};
use crate::model::study::Study;

impl Metastore {
    pub async fn insert_study(&self, study: Study) -> error::Result<Study> {
        let mut studies = self.studies.write().await;

        if studies.contains_key(&study.study_id) {
            return Err(error::Error::DuplicateRecord {
                entity: "study",
                field: "study_id",
                value: study.study_id,
            });
        }

        studies.insert(study.study_id.clone(), study.clone());

        Ok(study)
    }

    /// Study codes are case-insensitive: rows are keyed by the upper-cased
    /// code, and lookups normalize the same way.
    pub async fn study(&self, study_id: &str) -> error::Result<Study> {
        self.studies
            .read()
            .await
            .get(&study_id.to_uppercase())
            .cloned()
            .ok_or_else(|| error::Error::not_found("study", study_id))
    }
}
