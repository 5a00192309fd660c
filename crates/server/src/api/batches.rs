//! Batch endpoints backed by the ledger.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use yoink_core::{
    ledger::ItemAnnotation,
    service::{BatchEnqueued, BatchItem},
    DownloadRequest, LedgerRecord, MediaMode,
};

use super::error::{service_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EnqueueBatchBody {
    pub items: Vec<BatchItem>,
    #[serde(default)]
    pub mode: MediaMode,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default = "default_skip_downloaded")]
    pub skip_downloaded: bool,
}

fn default_skip_downloaded() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    /// Comma-separated item ids to annotate. Without it every record is listed.
    #[serde(default)]
    pub items: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchDetailsResponse {
    Annotated {
        batch_id: String,
        items: Vec<ItemAnnotation>,
    },
    Records {
        batch_id: String,
        records: Vec<LedgerRecord>,
    },
}

#[derive(Debug, Serialize)]
pub struct ClearBatchResponse {
    pub batch_id: String,
    pub removed: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Queue every item of a batch, skipping ones already downloaded.
pub async fn enqueue_items(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
    Json(body): Json<EnqueueBatchBody>,
) -> Result<(StatusCode, Json<BatchEnqueued>), ApiError> {
    let mut template = DownloadRequest::new("");
    template.mode = body.mode;
    if let Some(quality) = body.quality {
        template.quality = quality;
    }

    let result = state
        .service()
        .enqueue_batch(&batch_id, body.items, &template, body.skip_downloaded)
        .map_err(service_error)?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
    Query(query): Query<BatchQuery>,
) -> Result<Json<BatchDetailsResponse>, ApiError> {
    let service = state.service();
    match query.items {
        Some(items) => {
            let ids: Vec<String> = items
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            let items = service
                .batch_details(&batch_id, &ids)
                .map_err(service_error)?;
            Ok(Json(BatchDetailsResponse::Annotated { batch_id, items }))
        }
        None => {
            let records = service.batch_records(&batch_id).map_err(service_error)?;
            Ok(Json(BatchDetailsResponse::Records { batch_id, records }))
        }
    }
}

pub async fn clear_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> Result<Json<ClearBatchResponse>, ApiError> {
    let removed = state
        .service()
        .clear_batch(&batch_id)
        .map_err(service_error)?;
    Ok(Json(ClearBatchResponse { batch_id, removed }))
}
