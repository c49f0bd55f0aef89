use std::sync::Arc;

use chrono::Utc;
use jsonschema::Validator;
use uuid::Uuid;

use super::{Metastore, error};
use crate::model::schema::{AnalysisSchema, AnalysisTypeSummary};

/// A registered schema version together with its compiled validator. The
/// validator is compiled once at registration and shared from then on.
#[derive(Clone)]
pub(super) struct StoredSchema {
    pub meta: AnalysisSchema,
    pub compiled: Arc<Validator>,
}

/// What `resolve` hands back to the payload validator.
#[derive(Clone)]
pub struct ResolvedSchema {
    pub name: String,
    pub version: u32,
    pub document: serde_json::Value,
    pub validator: Arc<Validator>,
}

impl Metastore {
    /// Registers `document` under `name` and assigns the next integer
    /// version, starting at 1. Stored verbatim, never overwritten.
    /// Re-registering content identical to an existing version of the same
    /// name is rejected rather than burning a new version number.
    pub async fn register_schema(
        &self,
        name: &str,
        document: serde_json::Value,
    ) -> error::Result<u32> {
        let compiled = jsonschema::validator_for(&document).map_err(|err| {
            error::Error::MalformedSchema {
                message: err.to_string(),
            }
        })?;

        let mut schemas = self.schemas.write().await;

        let mut latest = 0;
        for stored in schemas.iter().filter(|s| s.meta.name == name) {
            if stored.meta.schema == document {
                return Err(error::Error::DuplicateSchema {
                    name: name.to_string(),
                    version: stored.meta.version,
                });
            }
            latest = latest.max(stored.meta.version);
        }

        let version = latest + 1;
        schemas.push(StoredSchema {
            meta: AnalysisSchema {
                id: Uuid::now_v7(),
                name: name.to_string(),
                version,
                schema: document,
                analyses: Vec::new(),
                created_at: Utc::now(),
            },
            compiled: Arc::new(compiled),
        });

        Ok(version)
    }

    /// Resolves `(name, version)`; an omitted version means the latest
    /// registered version for that name.
    pub async fn resolve_schema(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> error::Result<ResolvedSchema> {
        let schemas = self.schemas.read().await;

        let found = schemas
            .iter()
            .filter(|s| s.meta.name == name)
            .filter(|s| version.is_none_or(|v| s.meta.version == v))
            .max_by_key(|s| s.meta.version);

        let Some(stored) = found else {
            return Err(error::Error::SchemaNotFound {
                name: name.to_string(),
                version,
            });
        };

        Ok(ResolvedSchema {
            name: stored.meta.name.clone(),
            version: stored.meta.version,
            document: stored.meta.schema.clone(),
            validator: Arc::clone(&stored.compiled),
        })
    }

    /// Full stored record for one schema, defaulting to the latest version.
    pub async fn schema(&self, name: &str, version: Option<u32>) -> error::Result<AnalysisSchema> {
        let schemas = self.schemas.read().await;

        schemas
            .iter()
            .filter(|s| s.meta.name == name)
            .filter(|s| version.is_none_or(|v| s.meta.version == v))
            .max_by_key(|s| s.meta.version)
            .map(|s| s.meta.clone())
            .ok_or_else(|| error::Error::SchemaNotFound {
                name: name.to_string(),
                version,
            })
    }

    /// All registered `(name, version)` pairs, for discovery.
    pub async fn list_schemas(&self) -> Vec<AnalysisTypeSummary> {
        let mut listed: Vec<_> = self
            .schemas
            .read()
            .await
            .iter()
            .map(|s| AnalysisTypeSummary {
                name: s.meta.name.clone(),
                version: s.meta.version,
            })
            .collect();

        listed.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));

        listed
    }

    /// Records validation provenance: the analysis is owned, for provenance
    /// purposes, by the schema version it was checked against.
    pub async fn attach_analysis_to_schema(
        &self,
        name: &str,
        version: u32,
        analysis_id: &str,
    ) -> error::Result<()> {
        let mut schemas = self.schemas.write().await;

        let stored = schemas
            .iter_mut()
            .find(|s| s.meta.name == name && s.meta.version == version)
            .ok_or_else(|| error::Error::SchemaNotFound {
                name: name.to_string(),
                version: Some(version),
            })?;

        stored.meta.analyses.push(analysis_id.to_string());

        Ok(())
    }

    /// A schema version may not be deleted while any analysis references it.
    pub async fn delete_schema(&self, name: &str, version: u32) -> error::Result<()> {
        let mut schemas = self.schemas.write().await;

        let position = schemas
            .iter()
            .position(|s| s.meta.name == name && s.meta.version == version)
            .ok_or_else(|| error::Error::SchemaNotFound {
                name: name.to_string(),
                version: Some(version),
            })?;

        if !schemas[position].meta.analyses.is_empty() {
            return Err(error::Error::SchemaInUse {
                name: name.to_string(),
                version,
            });
        }

        schemas.remove(position);

        Ok(())
    }
}
