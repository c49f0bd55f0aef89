use axum::{
    Router,
    routing::{get, post},
};

use super::AppState;

mod error;
mod handler;

pub(super) use error::error_body;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/studies", post(handler::create_study))
        .route("/studies/{study_id}", get(handler::study))
        .route("/studies/{study_id}/upload", post(handler::submit_upload))
        .route(
            "/studies/{study_id}/upload/{upload_id}",
            get(handler::upload_status),
        )
        .route(
            "/studies/{study_id}/upload/{upload_id}/save",
            post(handler::save_upload),
        )
        .route(
            "/studies/{study_id}/analysis/{analysis_id}",
            get(handler::analysis).put(handler::update_analysis),
        )
        .route(
            "/studies/{study_id}/analysis/{analysis_id}/publish",
            post(handler::publish_analysis),
        )
        .route(
            "/studies/{study_id}/analysis/{analysis_id}/suppress",
            post(handler::suppress_analysis),
        )
        .route(
            "/schemas",
            post(handler::register_schema).get(handler::list_schemas),
        )
        .route("/schemas/{name}", get(handler::latest_schema))
        .route(
            "/schemas/{name}/{version}",
            get(handler::schema_version).delete(handler::delete_schema),
        )
        .route(
            "/dev/objects/{object_id}",
            post(handler::mark_object_present),
        )
}
