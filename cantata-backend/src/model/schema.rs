use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use garde::Validate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use valuable::Valuable;

static ANALYSIS_TYPE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-zA-Z][a-zA-Z0-9_]*$").unwrap());

/// Request to register a named analysis-type schema. The server assigns the
/// version.
#[derive(Debug, Clone, Deserialize, Validate, Valuable)]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct RegisterAnalysisType {
    #[garde(custom(is_analysis_type_name))]
    pub name: String,
    #[valuable(skip)]
    pub schema: serde_json::Value,
}

fn is_analysis_type_name(value: &str, _context: &()) -> garde::Result {
    if ANALYSIS_TYPE_NAME.is_match(value) {
        Ok(())
    } else {
        Err(garde::Error::new(
            "analysis type names must start with a letter and contain only letters, digits and '_'",
        ))
    }
}

/// A registered schema version. Immutable once stored; new content means a
/// new version, never an in-place mutation. The `analyses` back-reference is
/// informational provenance, not consulted during validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSchema {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub schema: serde_json::Value,
    #[serde(skip)]
    pub analyses: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// `(name, version)` pair returned by discovery endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisTypeSummary {
    pub name: String,
    pub version: u32,
}
