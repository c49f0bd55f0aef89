use axum::{
    Json,
    extract::{
        Request,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use valuable::Valuable;

use crate::{db, service};

#[derive(thiserror::Error, Serialize, Debug, Clone, Valuable)]
#[serde(rename_all = "snake_case", tag = "type")]
pub(super) enum Error {
    #[error(transparent)]
    Service(#[from] service::error::Error),
    #[error("{message}")]
    MalformedRequest {
        #[serde(skip)]
        #[valuable(skip)]
        status: StatusCode,
        message: String,
    },
    #[error("{reason}")]
    InvalidData { reason: String },
    #[error("operation not permitted: {message}")]
    Permission { message: String },
}

impl Error {
    fn status_code(&self) -> StatusCode {
        use db::error::Error as Store;
        use service::error::Error as Service;

        match self {
            Self::MalformedRequest { status, .. } => *status,
            Self::InvalidData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Permission { .. } => StatusCode::FORBIDDEN,
            Self::Service(inner) => match inner {
                Service::Store(store) => match store {
                    Store::RecordNotFound { .. } | Store::SchemaNotFound { .. } => {
                        StatusCode::NOT_FOUND
                    }
                    Store::DuplicateRecord { .. }
                    | Store::DuplicateSchema { .. }
                    | Store::SchemaInUse { .. } => StatusCode::CONFLICT,
                    Store::MalformedSchema { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                },
                Service::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
                Service::InvalidAnalysisType { .. } | Service::SchemaViolation { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                Service::InvalidState { .. } | Service::UnpublishedFiles { .. } => {
                    StatusCode::CONFLICT
                }
                Service::StorageUnavailable { .. } => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn error_id(&self) -> &'static str {
        use db::error::Error as Store;
        use service::error::Error as Service;

        match self {
            Self::MalformedRequest { .. } => "malformed_request",
            Self::InvalidData { .. } => "invalid_data",
            Self::Permission { .. } => "forbidden",
            Self::Service(inner) => match inner {
                Service::Store(store) => match store {
                    Store::RecordNotFound { .. } => "record_not_found",
                    Store::DuplicateRecord { .. } => "duplicate_record",
                    Store::DuplicateSchema { .. } => "duplicate_schema",
                    Store::MalformedSchema { .. } => "malformed_schema",
                    Store::SchemaNotFound { .. } => "schema_not_found",
                    Store::SchemaInUse { .. } => "schema_in_use",
                },
                Service::MalformedPayload { .. } => "malformed_payload",
                Service::InvalidAnalysisType { .. } => "invalid_analysis_type",
                Service::SchemaViolation { .. } => "schema_violation",
                Service::InvalidState { .. } => "invalid_state",
                Service::UnpublishedFiles { .. } => "unpublished_files",
                Service::StorageUnavailable { .. } => "storage_unavailable",
            },
        }
    }
}

impl From<db::error::Error> for Error {
    fn from(err: db::error::Error) -> Self {
        Self::Service(err.into())
    }
}

impl From<JsonRejection> for Error {
    fn from(err: JsonRejection) -> Self {
        Self::MalformedRequest {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<PathRejection> for Error {
    fn from(err: PathRejection) -> Self {
        Self::MalformedRequest {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<garde::Report> for Error {
    fn from(err: garde::Report) -> Self {
        Self::InvalidData {
            reason: format!("{err:#}"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::error!(error = self.as_value());

        let mut response = self.status_code().into_response();
        response.extensions_mut().insert(self);

        response
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status: u16,
    error_id: &'static str,
    message: String,
    request_url: String,
    timestamp: DateTime<Utc>,
}

/// Turns a handler error left in the response extensions into the documented
/// body shape, carrying the URL of the request that failed.
pub(crate) async fn error_body(request: Request, next: Next) -> Response {
    let request_url = request.uri().to_string();
    let mut response = next.run(request).await;

    let Some(error) = response.extensions_mut().remove::<Error>() else {
        return response;
    };

    let body = ErrorBody {
        status: response.status().as_u16(),
        error_id: error.error_id(),
        message: error.to_string(),
        request_url,
        timestamp: Utc::now(),
    };

    (response.status(), Json(body)).into_response()
}

pub(super) type Result<T> = std::result::Result<T, Error>;
