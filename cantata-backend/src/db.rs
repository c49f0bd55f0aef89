pub mod error;

mod analysis;
mod composite;
mod schema;
mod study;
mod upload;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use tokio::sync::{Mutex, RwLock};

use crate::model::{
    analysis::AnalysisRecord,
    composite::{Donor, Sample, Specimen},
    file::File,
    study::Study,
    upload::Upload,
};

pub use composite::BusinessKey;
pub use schema::ResolvedSchema;

/// In-memory entity store. The relational layer proper is an external
/// collaborator; this realizes its interface: one persisted record per
/// logical entity, business-key uniqueness, and serialized state transitions
/// per upload identifier.
///
/// Lock order, where multiple tables are touched: uploads → analyses → files.
/// The composite-entity tables are only ever locked one at a time, under the
/// per-business-key critical sections handed out by [`Metastore::key_lock`].
#[derive(Default)]
pub struct Metastore {
    studies: RwLock<HashMap<String, Study>>,
    donors: RwLock<HashMap<String, Donor>>,
    specimens: RwLock<HashMap<String, Specimen>>,
    samples: RwLock<HashMap<String, Sample>>,
    files: RwLock<HashMap<String, File>>,
    analyses: RwLock<HashMap<String, AnalysisRecord>>,
    uploads: RwLock<HashMap<String, Upload>>,
    schemas: RwLock<Vec<schema::StoredSchema>>,
    key_locks: StdMutex<HashMap<BusinessKey, Arc<Mutex<()>>>>,
}

impl Metastore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
