//! Feed handler.

use crate::api::AppState;
use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// Content type the feed is served with
pub const FEED_CONTENT_TYPE: &str = "text/xml; charset=UTF-8";

/// GET /feeds.rss - The last successfully rebuilt feed
///
/// Answers 503 until the first poll cycle has succeeded.
pub async fn get_feed(State(state): State<AppState>) -> Response {
    match state.relay.feed_content_xml() {
        Some(xml) => (
            [(header::CONTENT_TYPE, FEED_CONTENT_TYPE)],
            xml.to_string(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "60")],
            "feed not built yet",
        )
            .into_response(),
    }
}
