//! # feed-relay
//!
//! Republishes a login-protected tracker RSS feed with every item rewritten
//! to point at a locally cached copy of its artifact.
//!
//! Each poll cycle:
//! - makes sure the upstream session is logged in, logging in again if not
//! - fetches and parses the upstream feed
//! - downloads every artifact not already in the cache
//! - rebuilds the feed from the items whose artifact is available
//! - publishes it for the front door to serve
//!
//! A failed cycle publishes nothing; the previous feed stays servable.
//!
//! ## Quick Start
//!
//! ```no_run
//! use feed_relay::{Config, FeedRelay, api};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("feed-relay.toml")?;
//!     let api_config = config.api.clone();
//!
//!     let relay = FeedRelay::new(config)?;
//!     let shutdown = CancellationToken::new();
//!     let (handle, _poller) = relay.spawn(shutdown.clone());
//!
//!     api::start_api_server(handle, &api_config, shutdown).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP front door
pub mod api;
/// Artifact cache
pub mod cache;
/// Shared upstream HTTP client and cookie jar
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Upstream feed fetching and parsing
pub mod feed;
/// Poll loop
pub mod poller;
/// Published feed slot
pub mod publish;
/// Output feed construction
pub mod rebuild;
/// Pipeline wiring
pub mod relay;
/// Upstream login session
pub mod session;

// Re-export commonly used types
pub use cache::{ArtifactCache, ArtifactId, DownloadOutcome, DownloadResult, DownloadSummary};
pub use config::{Config, LoginFlow};
pub use error::{AuthError, DownloadFailure, Error, FetchError, Result, WriteFailure};
pub use feed::{FeedFetchResult, FeedFetcher, FeedItem, ParsedFeed};
pub use poller::{CycleReport, PollState, PollStatus, Poller};
pub use publish::FeedPublisher;
pub use rebuild::{FeedRebuilder, OutputFeed};
pub use relay::{FeedRelay, RelayHandle};
pub use session::{Session, SessionManager};

/// Wait for a termination signal, then cancel `shutdown`.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use feed_relay::cancel_on_signal;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let shutdown = CancellationToken::new();
/// tokio::spawn(cancel_on_signal(shutdown.clone()));
/// shutdown.cancelled().await;
/// # }
/// ```
pub async fn cancel_on_signal(shutdown: tokio_util::sync::CancellationToken) {
    wait_for_signal().await;
    shutdown.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register both signal handlers, waiting on the other");
            only.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
