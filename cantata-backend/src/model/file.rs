use serde::{Deserialize, Serialize};
use strum::Display;

/// Access classification consulted by the external existence checker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileAccess {
    Open,
    Controlled,
}

/// One file entry from a submitted payload. `object_id` names the object in
/// external storage; when omitted it defaults to the generated file
/// identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedFile {
    pub file_name: String,
    pub file_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    pub file_access: FileAccess,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// Optional reference to the owning sample, by business key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_submitter_id: Option<String>,
}

/// Stored file. Files are not deduplicated by business key; each commit fully
/// replaces an analysis's file set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub file_id: String,
    pub analysis_id: String,
    pub study_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_id: Option<String>,
    pub file_name: String,
    pub file_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    pub file_access: FileAccess,
    pub object_id: String,
}
