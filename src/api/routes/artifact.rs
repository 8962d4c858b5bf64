//! Cached artifact handler.

use crate::api::AppState;
use crate::cache::ArtifactId;
use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

/// GET /torrent/:file - A cached artifact
///
/// Only complete `{id}.torrent` files are reachable; in-flight `.part` files
/// and anything else in the cache directory answer 404.
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(file): Path<String>,
    request: Request,
) -> Response {
    let Some(id) = ArtifactId::from_file_name(&file) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let path = state.relay.cache_dir().join(id.file_name());
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}
