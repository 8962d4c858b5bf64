//! Front door: serves the republished feed and the cached artifacts.
//!
//! This layer only reads; everything it exposes is produced by the poll loop.

use crate::config::ApiConfig;
use crate::relay::RelayHandle;
use crate::{Error, Result};
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the front door router
///
/// # Routes
///
/// - `GET /feeds.rss` - Republished feed (503 until the first successful cycle)
/// - `GET /torrent/{id}.torrent` - Cached artifact; any other name is 404
/// - `GET /health` - Health check with poll loop status
pub fn create_router(relay: RelayHandle, config: &ApiConfig) -> Router {
    let state = AppState::new(relay);

    let router = Router::new()
        .route("/feeds.rss", get(routes::get_feed))
        .route("/health", get(routes::health_check))
        .route("/torrent/:file", get(routes::get_artifact))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

/// Start the front door on the configured bind address.
///
/// Runs until `shutdown` is cancelled.
pub async fn start_api_server(
    relay: RelayHandle,
    config: &ApiConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let bind_address = config.bind_address;
    let app = create_router(relay, config);

    let listener = TcpListener::bind(bind_address).await.map_err(Error::Io)?;
    tracing::info!(address = %bind_address, "Front door listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::ApiServerError(e.to_string()))?;

    tracing::info!("Front door stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
