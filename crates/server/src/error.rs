use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use donor::DonorError;
use reshard_core::CoreError;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Database(db::DbError),
    Donor(DonorError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

fn database_error_parts(err: &db::DbError) -> (StatusCode, &'static str, String) {
    match err {
        db::DbError::DonorDocumentNotFound(id) => (
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Donor not found: {}", id),
        ),
        db::DbError::DuplicateDonorDocument(_)
        | db::DbError::StateConflict { .. }
        | db::DbError::NamespaceExists { .. } => {
            (StatusCode::CONFLICT, "conflict", err.to_string())
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "database_error",
            "Database error occurred".to_string(),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                database_error_parts(&err)
            }
            AppError::Donor(err) => match err {
                DonorError::NotPrimary => {
                    (StatusCode::SERVICE_UNAVAILABLE, "not_primary", err.to_string())
                }
                DonorError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
                DonorError::ConflictingDocument { .. } => {
                    (StatusCode::CONFLICT, "conflict", err.to_string())
                }
                DonorError::Core(ref e) => (StatusCode::BAD_REQUEST, "bad_request", e.to_string()),
                DonorError::Database(ref e) => {
                    tracing::error!("Database error: {:?}", e);
                    database_error_parts(e)
                }
                _ => {
                    tracing::error!("Donor error: {:?}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "donor_error", err.to_string())
                }
            },
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<db::DbError> for AppError {
    fn from(err: db::DbError) -> Self {
        AppError::Database(err)
    }
}

impl From<DonorError> for AppError {
    fn from(err: DonorError) -> Self {
        AppError::Donor(err)
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
