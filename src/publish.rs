//! The currently servable output feed.
//!
//! Publishing swaps in a new immutable document; readers holding the previous
//! `Arc<str>` keep a consistent copy until they drop it.

use crate::rebuild::OutputFeed;
use std::sync::Arc;
use tokio::sync::watch;

/// Single-writer slot holding the last successfully built feed
#[derive(Clone)]
pub struct FeedPublisher {
    tx: Arc<watch::Sender<Option<Arc<str>>>>,
}

impl FeedPublisher {
    /// Empty slot; nothing is servable until the first publish
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the servable feed
    pub fn publish(&self, feed: &OutputFeed) {
        self.tx.send_replace(Some(Arc::from(feed.xml.as_str())));
    }

    /// Current feed XML, `None` until the first successful cycle
    pub fn feed_content_xml(&self) -> Option<Arc<str>> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every publish
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<str>>> {
        self.tx.subscribe()
    }
}

impl Default for FeedPublisher {
    fn default() -> Self {
        Self::new()
    }
}
