//! Feed retrieval and parsing.
//!
//! The response body is never buffered whole: it is bridged from the async
//! byte stream into the RSS reader on a blocking thread, which consumes it as
//! it arrives.

use crate::client::ClientContext;
use crate::error::FetchError;
use futures::{Stream, TryStreamExt};
use reqwest::StatusCode;
use reqwest::header::REFERER;
use std::fmt::Display;
use std::io::BufRead;
use std::sync::{Arc, Mutex};
use tokio_util::bytes::Buf;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{debug, warn};

/// One entry of the upstream feed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedItem {
    /// Unique identifier (guid, falling back to link, then title)
    pub guid: String,

    /// Item link; embeds the artifact id
    pub link: String,

    /// Item title
    pub title: String,

    /// Publication date as it appeared in the feed
    pub pub_date: Option<String>,

    /// Item description
    pub description: Option<String>,
}

impl FeedItem {
    fn from_rss(item: &rss::Item) -> Self {
        let title = item.title().unwrap_or("").to_string();
        let link = item.link().unwrap_or("").to_string();
        let guid = item
            .guid()
            .map(|g| g.value().to_string())
            .filter(|g| !g.is_empty())
            .or_else(|| item.link().map(str::to_string))
            .unwrap_or_else(|| title.clone());

        Self {
            guid,
            link,
            title,
            pub_date: item.pub_date().map(str::to_string),
            description: item.description().map(str::to_string),
        }
    }
}

/// Channel-level attributes of the upstream feed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedMeta {
    /// Channel title
    pub title: String,
    /// Channel link
    pub link: String,
    /// Channel description
    pub description: String,
    /// Channel language
    pub language: Option<String>,
    /// Last build date as it appeared in the feed
    pub last_build_date: Option<String>,
}

/// Successfully parsed feed; items are in source order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    /// Channel attributes
    pub meta: FeedMeta,
    /// Items in the order they appear in the source
    pub items: Vec<FeedItem>,
}

/// Result object of [`FeedFetcher::fetch`]
///
/// Failures do not raise: they are reported through `error`, which callers
/// must check (or use [`into_result`](Self::into_result)).
#[derive(Clone, Debug, Default)]
pub struct FeedFetchResult {
    /// Parsed feed; empty when `error` is set
    pub feed: ParsedFeed,
    /// Transport, status or parse failure
    pub error: Option<FetchError>,
}

impl FeedFetchResult {
    /// Turn the error field into a `Result`
    pub fn into_result(self) -> Result<ParsedFeed, FetchError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.feed),
        }
    }
}

/// Retrieves the upstream feed through the authenticated client context
pub struct FeedFetcher {
    context: ClientContext,
}

impl FeedFetcher {
    /// Create a fetcher over a shared client context
    pub fn new(context: ClientContext) -> Self {
        Self { context }
    }

    /// Fetch and parse the feed
    pub async fn fetch(&self) -> FeedFetchResult {
        match self.fetch_feed().await {
            Ok(feed) => {
                debug!(item_count = feed.items.len(), "Parsed upstream feed");
                FeedFetchResult { feed, error: None }
            }
            Err(err) => {
                warn!(url = %self.context.endpoints().feed, error = %err, "Feed fetch failed");
                FeedFetchResult {
                    feed: ParsedFeed::default(),
                    error: Some(err),
                }
            }
        }
    }

    async fn fetch_feed(&self) -> Result<ParsedFeed, FetchError> {
        let url = self.context.endpoints().feed.clone();
        debug!(url = %url, "Fetching upstream feed");

        let response = self
            .context
            .get(url)
            .header(REFERER, self.context.base_url().as_str())
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        parse_stream(response.bytes_stream()).await
    }
}

/// Parse a feed from a byte stream as it arrives
///
/// A stream error surfaces as [`FetchError::Network`] even though the parser
/// is what observes it first.
async fn parse_stream<S, B, E>(body: S) -> Result<ParsedFeed, FetchError>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: Buf + Send + 'static,
    E: Display + 'static,
{
    let transport_error: Arc<Mutex<Option<String>>> = Arc::default();
    let seen = Arc::clone(&transport_error);
    let body = Box::pin(body.map_err(move |e| {
        let message = e.to_string();
        if let Ok(mut slot) = seen.lock() {
            slot.get_or_insert_with(|| message.clone());
        }
        std::io::Error::other(message)
    }));
    let reader = SyncIoBridge::new(StreamReader::new(body));

    let parsed = tokio::task::spawn_blocking(move || parse_feed(std::io::BufReader::new(reader)))
        .await
        .map_err(|e| FetchError::Parse(format!("parser task failed: {e}")))?;

    let transport_error = transport_error.lock().ok().and_then(|mut slot| slot.take());
    match (parsed, transport_error) {
        (Err(_), Some(message)) => Err(FetchError::Network(message)),
        (parsed, _) => parsed,
    }
}

/// Parse an RSS 2.0 document from a reader
pub fn parse_feed<R: BufRead>(reader: R) -> Result<ParsedFeed, FetchError> {
    let channel = rss::Channel::read_from(reader).map_err(|e| FetchError::Parse(e.to_string()))?;

    let meta = FeedMeta {
        title: channel.title().to_string(),
        link: channel.link().to_string(),
        description: channel.description().to_string(),
        language: channel.language().map(str::to_string),
        last_build_date: channel.last_build_date().map(str::to_string),
    };
    let items = channel.items().iter().map(FeedItem::from_rss).collect();

    Ok(ParsedFeed { meta, items })
}
