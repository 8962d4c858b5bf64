//! Output feed generation.

use crate::cache::{ArtifactId, DownloadResult};
use crate::config::OutputFeedConfig;
use crate::feed::FeedItem;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A fully rendered output feed, ready to publish
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputFeed {
    /// RSS document
    pub xml: String,
    /// Number of items in the document
    pub item_count: usize,
    /// When the document was rendered
    pub built_at: DateTime<Utc>,
}

/// Rewrites upstream items to point at the local artifact cache
pub struct FeedRebuilder {
    config: OutputFeedConfig,
}

impl FeedRebuilder {
    /// Create a rebuilder with fixed channel metadata
    pub fn new(config: OutputFeedConfig) -> Self {
        Self { config }
    }

    /// Public URL of a cached artifact: `{public_base_url}/torrent/{id}.torrent`
    pub fn artifact_url(&self, id: &ArtifactId) -> String {
        format!(
            "{}/torrent/{}",
            self.config.public_base_url.trim_end_matches('/'),
            id.file_name()
        )
    }

    /// Build the output feed
    ///
    /// Walks `items` in order and keeps those whose result (matched by guid)
    /// is available in the cache.
    pub fn build(&self, items: &[FeedItem], results: &[DownloadResult]) -> OutputFeed {
        let mut by_guid: HashMap<&str, &DownloadResult> = HashMap::with_capacity(results.len());
        for result in results {
            by_guid.entry(result.guid.as_str()).or_insert(result);
        }

        let entries: Vec<rss::Item> = items
            .iter()
            .filter_map(|item| {
                let result = by_guid.get(item.guid.as_str())?;
                if !result.outcome.is_available() {
                    return None;
                }
                let id = result.artifact_id.as_ref()?;
                Some(self.entry(item, id))
            })
            .collect();

        let built_at = Utc::now();
        let item_count = entries.len();

        let mut channel = rss::Channel::default();
        channel.set_title(self.config.title.as_str());
        channel.set_link(self.config.link.as_str());
        channel.set_description(self.config.description.as_str());
        channel.set_generator(Some(format!("feed-relay {}", env!("CARGO_PKG_VERSION"))));
        channel.set_last_build_date(Some(built_at.to_rfc2822()));
        channel.set_items(entries);

        OutputFeed {
            xml: channel.to_string(),
            item_count,
            built_at,
        }
    }

    fn entry(&self, item: &FeedItem, id: &ArtifactId) -> rss::Item {
        let mut guid = rss::Guid::default();
        guid.set_value(item.guid.as_str());
        guid.set_permalink(false);

        let mut entry = rss::Item::default();
        entry.set_title(Some(item.title.clone()));
        entry.set_link(Some(self.artifact_url(id)));
        entry.set_guid(Some(guid));
        entry.set_pub_date(item.pub_date.clone());
        entry
    }
}
