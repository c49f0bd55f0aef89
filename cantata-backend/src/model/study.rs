use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use valuable::Valuable;

/// Client request to create a study. The study code is supplied externally
/// and stored upper-cased.
#[derive(Debug, Clone, Deserialize, Validate, Valuable)]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct NewStudy {
    #[garde(length(min = 1), custom(is_study_code))]
    pub study_id: String,
    #[garde(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub organization: String,
}

fn is_study_code(value: &str, _context: &()) -> garde::Result {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(garde::Error::new(
            "study codes may only contain alphanumerics, '-' and '_'",
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    pub study_id: String,
    pub name: String,
    pub description: String,
    pub organization: String,
    pub created_at: DateTime<Utc>,
}

impl Study {
    #[must_use]
    pub fn from_request(request: NewStudy) -> Self {
        let NewStudy {
            study_id,
            name,
            description,
            organization,
        } = request;

        Self {
            study_id: study_id.to_uppercase(),
            name,
            description,
            organization,
            created_at: Utc::now(),
        }
    }
}
