//! System handlers: health.

use crate::api::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

/// GET /health - Health check with poll loop status
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.relay.status();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "feed_ready": state.relay.feed_content_xml().is_some(),
        "poll": status,
    }))
}
