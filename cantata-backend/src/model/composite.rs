use serde::{Deserialize, Serialize};

/// One denormalized donor → specimen → sample subtree as it appears in a
/// submitted payload. Submitter identifiers are the business keys the
/// reconciler deduplicates on; the classification fields are descriptive and
/// merged by overwrite when the entity already exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedSample {
    pub sample_submitter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_type: Option<String>,
    pub donor: SubmittedDonor,
    pub specimen: SubmittedSpecimen,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedDonor {
    pub donor_submitter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_gender: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedSpecimen {
    pub specimen_submitter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specimen_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specimen_type: Option<String>,
}

/// Stored donor. The system identifier is generated once and never changes;
/// `(study_id, submitter_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Donor {
    pub donor_id: String,
    pub study_id: String,
    pub donor_submitter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_gender: Option<String>,
}

/// Stored specimen; `(study_id, donor_id, submitter_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Specimen {
    pub specimen_id: String,
    pub study_id: String,
    pub donor_id: String,
    pub specimen_submitter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specimen_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specimen_type: Option<String>,
}

/// Stored sample; `(study_id, specimen_id, submitter_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub sample_id: String,
    pub study_id: String,
    pub specimen_id: String,
    pub sample_submitter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_type: Option<String>,
}

/// Fully assembled subtree, returned when reading an analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompositeEntity {
    #[serde(flatten)]
    pub sample: Sample,
    pub specimen: Specimen,
    pub donor: Donor,
}
