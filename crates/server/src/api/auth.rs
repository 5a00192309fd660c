//! Cookie authentication and cover art uploads.

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::error::{api_error, internal, ApiError};
use crate::state::AppState;

const COVERS_DIR: &str = ".covers";
const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    /// True when the cookie file exists and is non-empty.
    pub authenticated: bool,
}

#[derive(Debug, Serialize)]
pub struct CookiesUpdatedResponse {
    pub authenticated: bool,
    pub bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct CoverUploadedResponse {
    /// Pass back as `cover_path` in a download request.
    pub path: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn auth_status(State(state): State<Arc<AppState>>) -> Json<AuthStatusResponse> {
    let authenticated = tokio::fs::metadata(state.cookies_file())
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false);
    Json(AuthStatusResponse { authenticated })
}

/// Replace the cookie file with the request body (Netscape format).
pub async fn put_cookies(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CookiesUpdatedResponse>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(api_error(StatusCode::BAD_REQUEST, "cookie file is empty"));
    }

    let path = state.cookies_file();
    write_replacing(path, &body).await.map_err(internal)?;
    info!(path = ?path, bytes = body.len(), "Cookie file updated");

    Ok(Json(CookiesUpdatedResponse {
        authenticated: true,
        bytes: body.len(),
    }))
}

/// Store an uploaded cover image and return its path.
pub async fn upload_cover(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CoverUploadedResponse>), ApiError> {
    let mut data: Option<(Bytes, Option<String>)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e)))?;
        data = Some((bytes, file_name));
    }

    let Some((bytes, file_name)) = data else {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing 'file' field"));
    };
    if bytes.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "cover file is empty"));
    }

    let ext = cover_extension(file_name.as_deref());
    let path = state
        .downloads_dir()
        .join(COVERS_DIR)
        .join(format!("{}.{}", Uuid::new_v4(), ext));
    write_replacing(&path, &bytes).await.map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        Json(CoverUploadedResponse {
            path: path.to_string_lossy().into_owned(),
        }),
    ))
}

/// Lowercased extension of an image upload, `jpg` when missing or unknown.
fn cover_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| COVER_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or_else(|| "jpg".to_string())
}

/// Write through a sibling temp file so readers never see a partial file.
async fn write_replacing(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("upload");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}
