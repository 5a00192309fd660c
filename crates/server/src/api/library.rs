//! Download history and pitch/speed presets.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use yoink_core::{
    settings::{Preset, PresetError, PresetList},
    HistoryEntry,
};

use super::error::{api_error, internal, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

pub async fn list_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    state.history().list().map(Json).map_err(internal)
}

pub async fn clear_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.history().clear().map_err(internal)?;
    Ok(Json(StatusResponse {
        status: "cleared".to_string(),
    }))
}

fn preset_error(e: PresetError) -> ApiError {
    match e {
        PresetError::Settings(_) => internal(e),
        PresetError::NotFound(_) => api_error(StatusCode::NOT_FOUND, e),
        _ => api_error(StatusCode::BAD_REQUEST, e),
    }
}

pub async fn list_presets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PresetList>, ApiError> {
    state.presets().list().map(Json).map_err(preset_error)
}

/// Add or replace a custom preset.
pub async fn save_preset(
    State(state): State<Arc<AppState>>,
    Json(preset): Json<Preset>,
) -> Result<Json<PresetList>, ApiError> {
    state.presets().save(preset).map(Json).map_err(preset_error)
}

pub async fn delete_preset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<PresetList>, ApiError> {
    let presets = state.presets();
    presets.delete(&name).map_err(preset_error)?;
    presets.list().map(Json).map_err(preset_error)
}
