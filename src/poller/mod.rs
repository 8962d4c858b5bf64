//! Poll loop: session check, feed fetch, artifact caching, rebuild, publish.
//!
//! One cycle runs the stages strictly in sequence and aborts on the first
//! cycle-fatal error. A successful cycle publishes the rebuilt feed and waits
//! `check_interval`; a failed one publishes nothing and waits `retry_backoff`.
//! There is no retry limit; the last good feed stays published throughout.
//!
//! `run_cycle` takes `&mut self`, so two cycles can never overlap.
//!
//! # Example
//!
//! ```no_run
//! use feed_relay::{Config, FeedRelay};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("feed-relay.toml")?;
//! let relay = FeedRelay::new(config)?;
//! let handle = relay.handle();
//! let shutdown = CancellationToken::new();
//!
//! tokio::spawn(relay.into_poller().run(shutdown.clone()));
//!
//! // later
//! let xml = handle.feed_content_xml();
//! # Ok(())
//! # }
//! ```

use crate::cache::{ArtifactCache, DownloadSummary};
use crate::config::PollConfig;
use crate::error::Result;
use crate::feed::FeedFetcher;
use crate::publish::FeedPublisher;
use crate::rebuild::FeedRebuilder;
use crate::session::{Session, SessionManager};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Whether a cycle is in flight
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    /// Between cycles
    #[default]
    Idle,
    /// A cycle is executing
    Running,
}

/// Snapshot of the poll loop, for health reporting
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PollStatus {
    /// Current state
    pub state: PollState,
    /// End of the last successful cycle
    pub last_success: Option<DateTime<Utc>>,
    /// End of the last failed cycle
    pub last_failure: Option<DateTime<Utc>>,
    /// Error of the last cycle, cleared by a success
    pub last_error: Option<String>,
    /// Failed cycles since the last success
    pub consecutive_failures: u32,
    /// Successful cycles since start
    pub cycles_completed: u64,
    /// Items in the currently published feed
    pub published_items: usize,
}

/// What a successful cycle did
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    /// Session check outcome
    pub session: Session,
    /// Items in the upstream feed
    pub fetched_items: usize,
    /// Cache pass counts
    pub downloads: DownloadSummary,
    /// Items in the published feed
    pub published_items: usize,
}

/// The pipeline stages and the loop that drives them
pub struct Poller {
    session: SessionManager,
    fetcher: FeedFetcher,
    cache: ArtifactCache,
    rebuilder: FeedRebuilder,
    publisher: FeedPublisher,
    config: PollConfig,
    status: watch::Sender<PollStatus>,
}

impl Poller {
    /// Assemble a poller from its stages
    pub fn new(
        session: SessionManager,
        fetcher: FeedFetcher,
        cache: ArtifactCache,
        rebuilder: FeedRebuilder,
        publisher: FeedPublisher,
        config: PollConfig,
    ) -> Self {
        let (status, _rx) = watch::channel(PollStatus::default());
        Self {
            session,
            fetcher,
            cache,
            rebuilder,
            publisher,
            config,
            status,
        }
    }

    /// Receiver for [`PollStatus`] updates
    pub fn status(&self) -> watch::Receiver<PollStatus> {
        self.status.subscribe()
    }

    /// Run one full cycle and record its outcome in the status
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.status.send_modify(|s| s.state = PollState::Running);

        let result = self.execute().await;

        let now = Utc::now();
        self.status.send_modify(|s| {
            s.state = PollState::Idle;
            match &result {
                Ok(report) => {
                    s.last_success = Some(now);
                    s.last_error = None;
                    s.consecutive_failures = 0;
                    s.cycles_completed += 1;
                    s.published_items = report.published_items;
                }
                Err(e) => {
                    s.last_failure = Some(now);
                    s.last_error = Some(e.to_string());
                    s.consecutive_failures = s.consecutive_failures.saturating_add(1);
                }
            }
        });
        result
    }

    async fn execute(&self) -> Result<CycleReport> {
        let session = self.session.ensure_authenticated().await?;

        let feed = self.fetcher.fetch().await.into_result()?;
        debug!(item_count = feed.items.len(), "Fetched upstream feed");

        let results = self.cache.download_all(&feed.items).await;
        let downloads = DownloadSummary::of(&results);

        let output = self.rebuilder.build(&feed.items, &results);
        self.publisher.publish(&output);
        info!(items = output.item_count, "Published new feed");

        Ok(CycleReport {
            session,
            fetched_items: feed.items.len(),
            downloads,
            published_items: output.item_count,
        })
    }

    /// Run cycles until `shutdown` is cancelled
    ///
    /// Cancellation is observed between cycles; a cycle in flight always
    /// runs to completion.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval = ?self.config.check_interval,
            backoff = ?self.config.retry_backoff,
            "Poll loop started"
        );

        loop {
            let delay = match self.run_cycle().await {
                Ok(report) => {
                    info!(
                        fetched = report.fetched_items,
                        downloaded = report.downloads.downloaded,
                        failed = report.downloads.failed,
                        published = report.published_items,
                        relogged = report.session.refreshed,
                        "Poll cycle finished"
                    );
                    self.config.check_interval
                }
                Err(e) => {
                    error!(
                        error = %e,
                        backoff = ?self.config.retry_backoff,
                        "Poll cycle failed, backing off"
                    );
                    self.config.retry_backoff
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!("Poll loop stopped");
    }
}
