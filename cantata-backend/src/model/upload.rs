use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Upload lifecycle. Validation failures do not introduce an extra state:
/// an upload that failed validation stays `Created` with its violation list
/// populated, which is distinct from `Created` with no violations (pending).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadState {
    Created,
    Validated,
    Saved,
}

/// Ephemeral envelope tracking one submission from receipt through
/// validation to commit. Never resurrected after a terminal failure; clients
/// submit a new upload instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub upload_id: String,
    pub study_id: String,
    pub state: UploadState,
    #[serde(skip)]
    pub payload: String,
    pub errors: Vec<String>,
    /// Schema version the payload was validated against, recorded when the
    /// upload transitions to `Validated`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_type_version: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Upload {
    #[must_use]
    pub fn new(upload_id: String, study_id: String, payload: String) -> Self {
        let now = Utc::now();

        Self {
            upload_id,
            study_id,
            state: UploadState::Created,
            payload,
            errors: Vec::new(),
            analysis_type_version: None,
            created_at: now,
            updated_at: now,
        }
    }
}
