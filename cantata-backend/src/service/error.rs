use itertools::Itertools;
use serde::Serialize;
use valuable::Valuable;

use crate::db;

#[derive(thiserror::Error, Debug, Serialize, Valuable, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Error {
    #[error(transparent)]
    Store(#[from] db::error::Error),
    #[error("unable to parse the submitted payload: {message}")]
    MalformedPayload { message: String },
    #[error("'{name}' does not name a known experiment variant")]
    InvalidAnalysisType { name: String },
    #[error("payload failed schema validation: {}", violations.iter().join("; "))]
    SchemaViolation { violations: Vec<String> },
    #[error("{entity} {id} is in state '{actual}', but must be in state '{required}'")]
    InvalidState {
        entity: &'static str,
        id: String,
        required: String,
        actual: String,
    },
    #[error(
        "the following objects must be present in storage before analysis {analysis_id} can be published: {}",
        missing.iter().join(", ")
    )]
    UnpublishedFiles {
        analysis_id: String,
        missing: Vec<String>,
    },
    #[error("object storage could not be consulted: {message}")]
    StorageUnavailable { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
