//! HTTP surface: health probe, sandbox page, and the WebSocket endpoint.

pub mod ws;

use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

const SANDBOX_PLACEHOLDER: &str = "<!doctype html><html><body>\
    <p>No sandbox preview yet. Ask Voco to mock something up.</p>\
    </body></html>";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sandbox", get(sandbox))
        .route("/ws/voco-stream", get(ws::voco_stream))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// The current sandbox HTML, or a placeholder. Never cached — the client
/// iframe reloads on every `sandbox_updated`.
async fn sandbox(State(state): State<AppState>) -> impl IntoResponse {
    let html = state.sandbox.read().clone();
    let body = if html.is_empty() {
        SANDBOX_PLACEHOLDER.to_string()
    } else {
        html
    };
    ([(header::CACHE_CONTROL, "no-store")], Html(body))
}
