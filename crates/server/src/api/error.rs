//! Error body shared by all handlers and the status each failure maps to.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use yoink_core::{worker::PoolError, ExtractorError, JobError, LedgerError, ServiceError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

pub fn internal(error: impl ToString) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, error)
}

impl From<ServiceError> for ErrorResponse {
    fn from(e: ServiceError) -> Self {
        Self {
            error: e.to_string(),
        }
    }
}

fn status_for(e: &ServiceError) -> StatusCode {
    match e {
        ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ServiceError::Job(JobError::NotFound(_)) => StatusCode::NOT_FOUND,
        ServiceError::Job(JobError::Terminal { .. }) => StatusCode::CONFLICT,
        ServiceError::Ledger(LedgerError::NotFound { .. }) => StatusCode::NOT_FOUND,
        ServiceError::Ledger(LedgerError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        ServiceError::Pool(PoolError::ItemActive { .. }) => StatusCode::CONFLICT,
        ServiceError::Pool(PoolError::ShutDown) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Extractor(ExtractorError::NotAPlaylist) => StatusCode::BAD_REQUEST,
        ServiceError::Extractor(ExtractorError::BinaryNotFound { .. }) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ServiceError::Extractor(_) => StatusCode::BAD_GATEWAY,
        ServiceError::CorruptRequest { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a service failure to its HTTP status and body.
pub fn service_error(e: ServiceError) -> ApiError {
    let status = status_for(&e);
    (status, Json(ErrorResponse::from(e)))
}
