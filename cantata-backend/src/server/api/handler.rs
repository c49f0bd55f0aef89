use axum::{
    Json,
    extract::{FromRequest, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use garde::Validate;
use serde::Serialize;
use valuable::Valuable;

use super::error::{Error, Result};
use crate::{
    model::{
        analysis::{Analysis, AnalysisPayload},
        schema::{AnalysisSchema, AnalysisTypeSummary, RegisterAnalysisType},
        study::{NewStudy, Study},
        upload::{Upload, UploadState},
    },
    server::AppState,
};

pub(super) struct ValidJson<T>(T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: Validate,
    <T as Validate>::Context: std::default::Default,
{
    type Rejection = Error;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let axum::Json(data) = axum::Json::<T>::from_request(req, state).await?;
        data.validate()?;

        Ok(Self(data))
    }
}

impl<T: Serialize> IntoResponse for ValidJson<T> {
    fn into_response(self) -> Response {
        let Self(inner) = self;

        axum::Json(inner).into_response()
    }
}

pub(super) async fn create_study(
    State(state): State<AppState>,
    ValidJson(new_study): ValidJson<NewStudy>,
) -> Result<Json<Study>> {
    tracing::debug!(deserialized_study = new_study.as_value());

    let study = state
        .store()
        .insert_study(Study::from_request(new_study))
        .await?;

    Ok(Json(study))
}

pub(super) async fn study(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
) -> Result<Json<Study>> {
    Ok(Json(state.store().study(&study_id).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UploadReceipt {
    upload_id: String,
    state: UploadState,
}

/// The submitted document is kept verbatim, so the body is taken as raw text
/// rather than decoded JSON.
pub(super) async fn submit_upload(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
    payload: String,
) -> Result<Json<UploadReceipt>> {
    let upload_id = state.uploads().receive(&study_id, payload).await?;

    Ok(Json(UploadReceipt {
        upload_id,
        state: UploadState::Created,
    }))
}

pub(super) async fn upload_status(
    State(state): State<AppState>,
    Path((study_id, upload_id)): Path<(String, String)>,
) -> Result<Json<Upload>> {
    Ok(Json(state.uploads().status(&study_id, &upload_id).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SavedAnalysis {
    analysis_id: String,
}

pub(super) async fn save_upload(
    State(state): State<AppState>,
    Path((study_id, upload_id)): Path<(String, String)>,
) -> Result<Json<SavedAnalysis>> {
    let analysis_id = state.uploads().commit(&study_id, &upload_id).await?;

    Ok(Json(SavedAnalysis { analysis_id }))
}

pub(super) async fn analysis(
    State(state): State<AppState>,
    Path((study_id, analysis_id)): Path<(String, String)>,
) -> Result<Json<Analysis>> {
    Ok(Json(
        analysis_in_study(&state, &study_id, &analysis_id).await?,
    ))
}

pub(super) async fn update_analysis(
    State(state): State<AppState>,
    Path((study_id, analysis_id)): Path<(String, String)>,
    payload: String,
) -> Result<Json<Analysis>> {
    let payload: AnalysisPayload =
        serde_json::from_str(&payload).map_err(|err| Error::MalformedRequest {
            status: StatusCode::BAD_REQUEST,
            message: err.to_string(),
        })?;

    state
        .analyses()
        .update(&study_id, &analysis_id, payload)
        .await?;

    Ok(Json(state.analyses().read(&analysis_id).await?))
}

pub(super) async fn publish_analysis(
    State(state): State<AppState>,
    Path((study_id, analysis_id)): Path<(String, String)>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<()> {
    analysis_in_study(&state, &study_id, &analysis_id).await?;

    let token = auth.map(|TypedHeader(header)| header.token().to_string());
    state
        .analyses()
        .publish(token.as_deref(), &analysis_id)
        .await?;

    Ok(())
}

pub(super) async fn suppress_analysis(
    State(state): State<AppState>,
    Path((study_id, analysis_id)): Path<(String, String)>,
) -> Result<()> {
    analysis_in_study(&state, &study_id, &analysis_id).await?;

    state.analyses().suppress(&analysis_id).await?;

    Ok(())
}

pub(super) async fn register_schema(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<RegisterAnalysisType>,
) -> Result<Json<AnalysisTypeSummary>> {
    tracing::debug!(deserialized_schema = request.as_value());

    let version = state
        .store()
        .register_schema(&request.name, request.schema)
        .await?;

    Ok(Json(AnalysisTypeSummary {
        name: request.name,
        version,
    }))
}

pub(super) async fn list_schemas(
    State(state): State<AppState>,
) -> Json<Vec<AnalysisTypeSummary>> {
    Json(state.store().list_schemas().await)
}

pub(super) async fn latest_schema(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AnalysisSchema>> {
    Ok(Json(state.store().schema(&name, None).await?))
}

pub(super) async fn schema_version(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, u32)>,
) -> Result<Json<AnalysisSchema>> {
    Ok(Json(state.store().schema(&name, Some(version)).await?))
}

pub(super) async fn delete_schema(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, u32)>,
) -> Result<()> {
    state.store().delete_schema(&name, version).await?;

    Ok(())
}

/// Dev-only escape hatch for exercising the publish flow without a real
/// object store.
pub(super) async fn mark_object_present(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
) -> Result<()> {
    if !state.is_dev() {
        return Err(Error::Permission {
            message: "objects can only be marked present in dev mode".to_string(),
        });
    }

    state.existence().mark_present(&object_id).await?;

    Ok(())
}

async fn analysis_in_study(
    state: &AppState,
    study_id: &str,
    analysis_id: &str,
) -> Result<Analysis> {
    let analysis = state.analyses().read(analysis_id).await?;

    if !analysis.study_id.eq_ignore_ascii_case(study_id) {
        return Err(crate::db::error::Error::not_found("analysis", analysis_id).into());
    }

    Ok(analysis)
}
