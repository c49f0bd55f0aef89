use std::sync::Arc;

use serde_json::Value;
use valuable::Valuable;

use super::error;
use crate::{db::Metastore, model::analysis::AnalysisPayload};

/// Outcome of validating one submitted payload. `Valid` carries the schema
/// version that was actually used, so the commit path can record provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid { analysis_type_version: u32 },
    Invalid { violations: Vec<String> },
}

/// Validates submitted payloads against the registered analysis-type
/// schemas. Runs off the request path: `dispatch` schedules the work on the
/// runtime and the outcome lands in the upload record, where clients poll
/// for it.
pub struct PayloadValidator {
    store: Arc<Metastore>,
}

impl PayloadValidator {
    #[must_use]
    pub fn new(store: Arc<Metastore>) -> Self {
        Self { store }
    }

    /// Schedules validation of an upload as a background task. The
    /// submitting call has already returned by the time this runs.
    pub fn dispatch(self: &Arc<Self>, upload_id: String) {
        let validator = Arc::clone(self);

        tokio::spawn(async move {
            if let Err(err) = validator.process(&upload_id).await {
                tracing::error!(upload_id, error = err.as_value(), "validation task failed");
            }
        });
    }

    /// The unit of background work: validate the upload's payload and record
    /// the outcome. Tests call this inline for deterministic completion.
    pub async fn process(&self, upload_id: &str) -> error::Result<()> {
        let upload = self.store.upload(upload_id).await?;

        match self.validate(&upload.payload).await {
            ValidationOutcome::Valid {
                analysis_type_version,
            } => {
                tracing::debug!(upload_id, analysis_type_version, "payload validated");
                self.store
                    .record_validation_success(upload_id, analysis_type_version)
                    .await?;
            }
            ValidationOutcome::Invalid { violations } => {
                tracing::debug!(
                    upload_id,
                    violations = violations.as_value(),
                    "payload rejected"
                );
                self.store
                    .record_validation_failure(upload_id, violations)
                    .await?;
            }
        }

        Ok(())
    }

    /// Validates a raw payload. Steps run in order and short-circuit on the
    /// first failing step, but within the schema step *all* violations are
    /// collected, not just the first.
    pub async fn validate(&self, payload: &str) -> ValidationOutcome {
        let invalid = |violations| ValidationOutcome::Invalid { violations };

        // 1. The payload must be well-formed JSON.
        let document: Value = match serde_json::from_str(payload) {
            Ok(document) => document,
            Err(err) => return invalid(vec![format!("malformed payload: {err}")]),
        };

        // 2. The declared analysis type must resolve to a registered schema.
        let Some(declared) = document.pointer("/analysisType").and_then(Value::as_str) else {
            return invalid(vec!["payload does not declare an analysisType".to_string()]);
        };
        let declared_version = document
            .pointer("/analysisTypeVersion")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok());

        let resolved = match self.store.resolve_schema(declared, declared_version).await {
            Ok(resolved) => resolved,
            Err(err) => return invalid(vec![err.to_string()]),
        };

        // 3. Structural validation, collecting every violation.
        let violations: Vec<String> = resolved
            .validator
            .iter_errors(&document)
            .map(|err| format_violation(&err))
            .collect();
        if !violations.is_empty() {
            return invalid(violations);
        }

        // 4. Cross-field checks the schema cannot express.
        let parsed: AnalysisPayload = match serde_json::from_value(document) {
            Ok(parsed) => parsed,
            Err(err) => {
                return invalid(vec![format!(
                    "payload does not describe a known experiment variant: {err}"
                )]);
            }
        };
        let violations = cross_field_violations(&parsed);
        if !violations.is_empty() {
            return invalid(violations);
        }

        ValidationOutcome::Valid {
            analysis_type_version: resolved.version,
        }
    }
}

fn format_violation(err: &jsonschema::ValidationError<'_>) -> String {
    let path = err.instance_path().to_string();

    if path.is_empty() {
        err.to_string()
    } else {
        format!("{path}: {err}")
    }
}

/// Composite-entity references must carry every identifying field, and file
/// entries must be internally consistent with the submitted samples.
fn cross_field_violations(payload: &AnalysisPayload) -> Vec<String> {
    let mut violations = Vec::new();

    if payload.sample.is_empty() {
        violations.push("payload must reference at least one sample".to_string());
    }

    for (index, sample) in payload.sample.iter().enumerate() {
        if sample.donor.donor_submitter_id.trim().is_empty() {
            violations.push(format!("sample[{index}]: donorSubmitterId must not be empty"));
        }
        if sample.specimen.specimen_submitter_id.trim().is_empty() {
            violations.push(format!(
                "sample[{index}]: specimenSubmitterId must not be empty"
            ));
        }
        if sample.sample_submitter_id.trim().is_empty() {
            violations.push(format!("sample[{index}]: sampleSubmitterId must not be empty"));
        }
    }

    for (index, file) in payload.file.iter().enumerate() {
        if file.file_name.trim().is_empty() {
            violations.push(format!("file[{index}]: fileName must not be empty"));
        }
        if file.file_size < 0 {
            violations.push(format!("file[{index}]: fileSize must not be negative"));
        }
        if let Some(submitter_id) = &file.sample_submitter_id {
            let known = payload
                .sample
                .iter()
                .any(|s| &s.sample_submitter_id == submitter_id);
            if !known {
                violations.push(format!(
                    "file[{index}]: sampleSubmitterId '{submitter_id}' does not match any submitted sample"
                ));
            }
        }
    }

    violations
}
