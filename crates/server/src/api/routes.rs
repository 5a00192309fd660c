use axum::{
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::warn;

use super::{auth, batches, downloads, handlers, library, middleware::metrics_middleware, playlist, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Web UI static files path (configurable via env)
    let static_dir = std::env::var("YOINK_STATIC_DIR").unwrap_or_else(|_| "static".to_string());

    let cors = cors_layer(state.cors_allowed_origins());

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Downloads
        .route("/downloads", post(downloads::create_download))
        .route("/downloads", get(downloads::list_downloads))
        .route("/downloads/retry", post(downloads::retry_download))
        .route("/downloads/{id}", get(downloads::get_download))
        .route("/downloads/{id}", delete(downloads::cancel_download))
        .route("/info", post(downloads::get_info))
        // Batches (ledger)
        .route("/batches/{batch_id}/items", post(batches::enqueue_items))
        .route("/batches/{batch_id}", get(batches::get_batch))
        .route("/batches/{batch_id}", delete(batches::clear_batch))
        .route("/playlist/details", post(playlist::playlist_details))
        // History and presets
        .route("/history", get(library::list_history))
        .route("/history", delete(library::clear_history))
        .route("/presets", get(library::list_presets))
        .route("/presets", post(library::save_preset))
        .route("/presets/{name}", delete(library::delete_preset))
        // Authentication and uploads
        .route("/auth/status", get(auth::auth_status))
        .route("/auth/cookies", put(auth::put_cookies))
        .route("/covers", post(auth::upload_cover))
        // Live updates
        .route("/ws", get(ws::ws_handler))
        .route("/ws/downloads/{id}", get(ws::job_ws_handler))
        .with_state(Arc::clone(&state));

    // Serve web UI with SPA fallback
    let index_path = format!("{}/index.html", static_dir);
    let serve_dir = ServeDir::new(&static_dir).fallback(ServeFile::new(&index_path));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics).with_state(state))
        .fallback_service(serve_dir)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Any origin when the list is empty, otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}
