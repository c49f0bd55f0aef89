use super::{Metastore, error};
use crate::model::{
    analysis::{AnalysisRecord, AnalysisState},
    file::File,
};

impl Metastore {
    pub async fn insert_analysis(&self, record: AnalysisRecord) -> error::Result<AnalysisRecord> {
        let mut analyses = self.analyses.write().await;

        if analyses.contains_key(&record.analysis_id) {
            return Err(error::Error::DuplicateRecord {
                entity: "analysis",
                field: "analysis_id",
                value: record.analysis_id,
            });
        }

        analyses.insert(record.analysis_id.clone(), record.clone());

        Ok(record)
    }

    pub async fn analysis(&self, analysis_id: &str) -> error::Result<AnalysisRecord> {
        self.analyses
            .read()
            .await
            .get(analysis_id)
            .cloned()
            .ok_or_else(|| error::Error::not_found("analysis", analysis_id))
    }

    pub async fn update_analysis(&self, record: AnalysisRecord) -> error::Result<AnalysisRecord> {
        let mut analyses = self.analyses.write().await;

        if !analyses.contains_key(&record.analysis_id) {
            return Err(error::Error::not_found("analysis", record.analysis_id));
        }
        analyses.insert(record.analysis_id.clone(), record.clone());

        Ok(record)
    }

    pub async fn set_analysis_state(
        &self,
        analysis_id: &str,
        state: AnalysisState,
    ) -> error::Result<()> {
        let mut analyses = self.analyses.write().await;

        let record = analyses
            .get_mut(analysis_id)
            .ok_or_else(|| error::Error::not_found("analysis", analysis_id))?;
        record.analysis_state = state;

        Ok(())
    }

    /// Marks an analysis published unless it was suppressed in the meantime.
    /// The state is re-read under the table lock, so a suppression landing
    /// while publish checks were in flight wins; the caller sees it in the
    /// returned state.
    pub async fn mark_analysis_published(
        &self,
        analysis_id: &str,
    ) -> error::Result<AnalysisState> {
        let mut analyses = self.analyses.write().await;

        let record = analyses
            .get_mut(analysis_id)
            .ok_or_else(|| error::Error::not_found("analysis", analysis_id))?;

        if record.analysis_state != AnalysisState::Suppressed {
            record.analysis_state = AnalysisState::Published;
        }

        Ok(record.analysis_state)
    }

    /// Replaces the full file set owned by an analysis: old associations are
    /// removed first, then the new rows are inserted. Files are never
    /// deduplicated by business key.
    pub async fn replace_files(
        &self,
        analysis_id: &str,
        new_files: Vec<File>,
    ) -> error::Result<Vec<File>> {
        let mut analyses = self.analyses.write().await;
        let mut files = self.files.write().await;

        let record = analyses
            .get_mut(analysis_id)
            .ok_or_else(|| error::Error::not_found("analysis", analysis_id))?;

        files.retain(|_, f| f.analysis_id != analysis_id);

        record.file_ids = new_files.iter().map(|f| f.file_id.clone()).collect();
        for file in &new_files {
            files.insert(file.file_id.clone(), file.clone());
        }

        Ok(new_files)
    }

    pub async fn analysis_count(&self) -> usize {
        self.analyses.read().await.len()
    }

    /// Files owned by an analysis, in submission order.
    pub async fn files_for_analysis(&self, analysis_id: &str) -> error::Result<Vec<File>> {
        let analyses = self.analyses.read().await;
        let files = self.files.read().await;

        let record = analyses
            .get(analysis_id)
            .ok_or_else(|| error::Error::not_found("analysis", analysis_id))?;

        Ok(record
            .file_ids
            .iter()
            .filter_map(|id| files.get(id).cloned())
            .collect())
    }
}
