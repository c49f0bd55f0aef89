pub mod analysis;
pub mod error;
pub mod existence;
pub mod reconcile;
pub mod upload;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use rstest::fixture;
    use serde_json::json;

    use super::{
        analysis::AnalysisOrchestrator, existence::ExistenceChecker, reconcile::CompositeEntityReconciler,
        upload::UploadService, validation::PayloadValidator,
    };
    use crate::{
        db::Metastore,
        id::IdGenerator,
        model::study::{NewStudy, Study},
    };

    pub const STUDY_ID: &str = "ABC123";

    pub struct TestContext {
        pub store: Arc<Metastore>,
        pub ids: Arc<IdGenerator>,
        pub existence: Arc<ExistenceChecker>,
        pub validator: Arc<PayloadValidator>,
        pub uploads: Arc<UploadService>,
        pub analyses: Arc<AnalysisOrchestrator>,
    }

    /// Fully wired service graph over a fresh in-memory store, with the test
    /// study and both experiment schemas registered.
    #[fixture]
    pub async fn ctx() -> TestContext {
        let store = Arc::new(Metastore::new());
        let ids = Arc::new(IdGenerator::with_seed(1));
        let existence = Arc::new(ExistenceChecker::fixed());

        let reconciler = CompositeEntityReconciler::new(Arc::clone(&store), Arc::clone(&ids));
        let analyses = Arc::new(AnalysisOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&ids),
            reconciler,
            Arc::clone(&existence),
        ));
        let validator = Arc::new(PayloadValidator::new(Arc::clone(&store)));
        let uploads = Arc::new(UploadService::new(
            Arc::clone(&store),
            Arc::clone(&ids),
            Arc::clone(&validator),
            Arc::clone(&analyses),
        ));

        store
            .insert_study(Study::from_request(NewStudy {
                study_id: STUDY_ID.to_string(),
                name: "Testing Study".to_string(),
                description: String::new(),
                organization: String::new(),
            }))
            .await
            .unwrap();

        store
            .register_schema("sequencingRead", sequencing_read_schema())
            .await
            .unwrap();
        store
            .register_schema("variantCall", variant_call_schema())
            .await
            .unwrap();

        TestContext {
            store,
            ids,
            existence,
            validator,
            uploads,
            analyses,
        }
    }

    pub fn sequencing_read_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["analysisType", "sample", "file", "experiment"],
            "properties": {
                "analysisType": { "const": "sequencingRead" },
                "experiment": {
                    "type": "object",
                    "required": ["alignmentTool"],
                    "properties": {
                        "aligned": { "type": "boolean" },
                        "alignmentTool": { "type": "string" },
                        "insertSize": { "type": "integer" },
                        "libraryStrategy": { "type": "string" },
                        "pairedEnd": { "type": "boolean" },
                        "referenceGenome": { "type": "string" }
                    }
                },
                "sample": { "type": "array", "minItems": 1 },
                "file": { "type": "array", "minItems": 1 }
            }
        })
    }

    pub fn variant_call_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["analysisType", "sample", "file", "experiment"],
            "properties": {
                "analysisType": { "const": "variantCall" },
                "experiment": {
                    "type": "object",
                    "required": ["variantCallingTool"],
                    "properties": {
                        "variantCallingTool": { "type": "string" },
                        "matchedNormalSampleSubmitterId": { "type": "string" }
                    }
                },
                "sample": { "type": "array", "minItems": 1 },
                "file": { "type": "array", "minItems": 1 }
            }
        })
    }

    pub fn sequencing_read_payload(object_id: &str) -> serde_json::Value {
        json!({
            "analysisType": "sequencingRead",
            "experiment": {
                "aligned": true,
                "alignmentTool": "BWA-MEM",
                "insertSize": 350,
                "libraryStrategy": "WGS",
                "pairedEnd": true,
                "referenceGenome": "GRCh38"
            },
            "sample": [{
                "sampleSubmitterId": "sample-1",
                "sampleType": "DNA",
                "donor": { "donorSubmitterId": "donor-1", "donorGender": "female" },
                "specimen": {
                    "specimenSubmitterId": "specimen-1",
                    "specimenClass": "Tumour",
                    "specimenType": "Primary tumour"
                }
            }],
            "file": [{
                "fileName": "reads.bam",
                "fileSize": 1_048_576,
                "fileType": "BAM",
                "fileAccess": "controlled",
                "objectId": object_id,
                "sampleSubmitterId": "sample-1"
            }]
        })
    }
}
