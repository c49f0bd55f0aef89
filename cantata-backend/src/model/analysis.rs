use serde::{Deserialize, Serialize};
use strum::Display;

use super::{
    composite::{CompositeEntity, SubmittedSample},
    file::{File, SubmittedFile},
};

pub const SEQUENCING_READ: &str = "sequencingRead";
pub const VARIANT_CALL: &str = "variantCall";

/// Analysis lifecycle. `Unpublished` is the implicit default after a commit;
/// `Published` requires every owned file to be confirmed present externally;
/// `Suppressed` is the unconditional withdrawal path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisState {
    Unpublished,
    Published,
    Suppressed,
}

/// The experiment variant of an analysis, discriminated by the payload's
/// top-level `analysisType` field with the variant attributes nested under
/// `experiment`. Adding a new experiment type is a new arm here plus a new
/// schema registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "analysisType", content = "experiment", rename_all = "camelCase")]
pub enum Experiment {
    #[serde(rename_all = "camelCase")]
    SequencingRead {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        aligned: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alignment_tool: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_size: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        library_strategy: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        paired_end: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference_genome: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    VariantCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variant_calling_tool: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        matched_normal_sample_submitter_id: Option<String>,
    },
}

impl Experiment {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SequencingRead { .. } => SEQUENCING_READ,
            Self::VariantCall { .. } => VARIANT_CALL,
        }
    }
}

/// A submitted analysis document, parsed after schema validation. The
/// `analysisType`/`experiment` pair lands in [`Experiment`]; everything else
/// is the denormalized entity graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    #[serde(flatten)]
    pub experiment: Experiment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_type_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study: Option<String>,
    pub sample: Vec<SubmittedSample>,
    pub file: Vec<SubmittedFile>,
}

/// Reference to the schema version an analysis was validated against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisTypeRef {
    pub name: String,
    pub version: u32,
}

/// Normalized analysis row: header fields plus the identifiers of the
/// entities it owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub analysis_id: String,
    pub study_id: String,
    pub analysis_type: AnalysisTypeRef,
    pub analysis_state: AnalysisState,
    pub experiment: Experiment,
    pub sample_ids: Vec<String>,
    pub file_ids: Vec<String>,
}

/// Fully denormalized view assembled by `read`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub analysis_id: String,
    pub study_id: String,
    pub analysis_type: AnalysisTypeRef,
    pub analysis_state: AnalysisState,
    #[serde(flatten)]
    pub experiment: Experiment,
    pub sample: Vec<CompositeEntity>,
    pub file: Vec<File>,
}
