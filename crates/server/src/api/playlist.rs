use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use yoink_core::service::PlaylistDetails;

use super::error::{service_error, ApiError};
use crate::state::AppState;

const DEFAULT_PLAYLIST_LIMIT: usize = 100;
const MAX_PLAYLIST_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct PlaylistDetailsBody {
    pub url: String,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Ledger batch to annotate from. Defaults to the playlist id.
    #[serde(default)]
    pub batch_id: Option<String>,
}

/// List a playlist with each entry marked `downloaded` or `pending`.
pub async fn playlist_details(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PlaylistDetailsBody>,
) -> Result<Json<PlaylistDetails>, ApiError> {
    let limit = body
        .limit
        .unwrap_or(DEFAULT_PLAYLIST_LIMIT)
        .clamp(1, MAX_PLAYLIST_LIMIT);

    state
        .service()
        .playlist_details(&body.url, limit, body.batch_id.as_deref())
        .await
        .map(Json)
        .map_err(service_error)
}
