//! Download job endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use yoink_core::{extractor::Metadata, DownloadRequest, Job};

use super::error::{service_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct EnqueuedResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct ListDownloadsResponse {
    /// Newest first.
    pub jobs: Vec<Job>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct RetryBody {
    pub batch_id: String,
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct InfoBody {
    pub url: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Queue a download.
pub async fn create_download(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DownloadRequest>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), ApiError> {
    let job_id = state.service().enqueue(request).map_err(service_error)?;
    Ok((StatusCode::ACCEPTED, Json(EnqueuedResponse { job_id })))
}

pub async fn list_downloads(State(state): State<Arc<AppState>>) -> Json<ListDownloadsResponse> {
    let mut jobs: Vec<Job> = state.service().list_all().into_values().collect();
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(ListDownloadsResponse {
        total: jobs.len(),
        jobs,
    })
}

pub async fn get_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state.service().status(&id).map(Json).map_err(service_error)
}

/// Cancel a queued or running download.
pub async fn cancel_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.service().cancel(&id).map_err(service_error)?;
    info!(job_id = %id, "Download cancelled via API");
    Ok(Json(job))
}

/// Re-run one batch item from its ledger record.
pub async fn retry_download(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RetryBody>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), ApiError> {
    let job_id = state
        .service()
        .retry(&body.batch_id, &body.item_id)
        .map_err(service_error)?;
    Ok((StatusCode::ACCEPTED, Json(EnqueuedResponse { job_id })))
}

/// Metadata for a single URL without downloading it.
pub async fn get_info(
    State(state): State<Arc<AppState>>,
    Json(body): Json<InfoBody>,
) -> Result<Json<Metadata>, ApiError> {
    state
        .service()
        .probe(&body.url)
        .await
        .map(Json)
        .map_err(service_error)
}
