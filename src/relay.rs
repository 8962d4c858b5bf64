//! Wiring of the pipeline stages around one shared client context.

use crate::cache::ArtifactCache;
use crate::client::ClientContext;
use crate::config::Config;
use crate::error::Result;
use crate::feed::FeedFetcher;
use crate::poller::{PollStatus, Poller};
use crate::publish::FeedPublisher;
use crate::rebuild::FeedRebuilder;
use crate::session::SessionManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A configured relay: the poll loop plus the read side it publishes to
pub struct FeedRelay {
    /// Validated configuration
    pub config: Arc<Config>,
    poller: Poller,
    handle: RelayHandle,
}

impl FeedRelay {
    /// Validate `config` and build every stage over a fresh, logged-out context
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let context = ClientContext::new(&config.upstream)?;
        let session = SessionManager::new(context.clone(), &config.upstream)?;
        let fetcher = FeedFetcher::new(context.clone());
        let cache = ArtifactCache::new(context, config.cache.cache_dir.clone());
        let rebuilder = FeedRebuilder::new(config.output.clone());
        let publisher = FeedPublisher::new();

        let poller = Poller::new(
            session,
            fetcher,
            cache,
            rebuilder,
            publisher.clone(),
            config.poll.clone(),
        );
        let handle = RelayHandle::new(publisher, poller.status(), config.cache.cache_dir.clone());

        info!(
            upstream = %config.upstream.base_url,
            cache_dir = %config.cache.cache_dir.display(),
            "Feed relay configured"
        );

        Ok(Self {
            config: Arc::new(config),
            poller,
            handle,
        })
    }

    /// Read-only handle for the front door
    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    /// Take the poll loop to drive it manually
    pub fn into_poller(self) -> Poller {
        self.poller
    }

    /// Spawn the poll loop on the current runtime
    pub fn spawn(self, shutdown: CancellationToken) -> (RelayHandle, JoinHandle<()>) {
        let handle = self.handle;
        let task = tokio::spawn(self.poller.run(shutdown));
        (handle, task)
    }
}

/// Cheap, cloneable read access to what the relay publishes
#[derive(Clone)]
pub struct RelayHandle {
    publisher: FeedPublisher,
    status: watch::Receiver<PollStatus>,
    cache_dir: PathBuf,
}

impl RelayHandle {
    pub(crate) fn new(
        publisher: FeedPublisher,
        status: watch::Receiver<PollStatus>,
        cache_dir: PathBuf,
    ) -> Self {
        Self {
            publisher,
            status,
            cache_dir,
        }
    }

    /// Current output feed, `None` until the first successful cycle
    pub fn feed_content_xml(&self) -> Option<Arc<str>> {
        self.publisher.feed_content_xml()
    }

    /// Latest poll loop status
    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn subscribe_status(&self) -> watch::Receiver<PollStatus> {
        self.status.clone()
    }

    /// Directory the cached artifacts are served from
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}
