use serde::Serialize;
use valuable::Valuable;

#[derive(thiserror::Error, Debug, Serialize, Valuable, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Error {
    #[error("{entity} {id} not found")]
    RecordNotFound { entity: &'static str, id: String },
    #[error("{entity} with {field} = {value} already exists")]
    DuplicateRecord {
        entity: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("schema content already registered as {name} version {version}")]
    DuplicateSchema { name: String, version: u32 },
    #[error("schema document could not be compiled: {message}")]
    MalformedSchema { message: String },
    #[error("analysis type {name}{} is not registered", version.map(|v| format!(" version {v}")).unwrap_or_default())]
    SchemaNotFound { name: String, version: Option<u32> },
    #[error("schema {name} version {version} is referenced by existing analyses")]
    SchemaInUse { name: String, version: u32 },
}

impl Error {
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
