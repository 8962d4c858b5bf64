//! Artifact cache: one `.torrent` file per feed item.
//!
//! The file at `{cache_dir}/{id}.torrent` is the only record that an artifact
//! is cached; there is no index. Downloads are written to `{id}.torrent.part`
//! and renamed into place once the write stream is closed, so the final path
//! only ever holds complete files. A failed download removes its partial file.
//!
//! Items are processed one at a time, in feed order. The upstream site rate
//! limits aggressively, so this must not be parallelized.

use crate::client::ClientContext;
use crate::error::{DownloadFailure, WriteFailure};
use crate::feed::FeedItem;
use futures::{Stream, StreamExt};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// File extension of cached artifacts
pub const ARTIFACT_EXTENSION: &str = "torrent";

#[allow(clippy::expect_used)]
static ARTIFACT_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"id=(\d+)&").expect("artifact id pattern is valid"));

/// Numeric artifact identifier embedded in a feed item link
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Extract the id from a link of the shape `...id=<digits>&...`
    pub fn from_link(link: &str) -> Option<Self> {
        ARTIFACT_ID_PATTERN
            .captures(link)
            .and_then(|caps| caps.get(1))
            .map(|m| Self(m.as_str().to_string()))
    }

    /// Parse a cache file name of the shape `{digits}.torrent`
    ///
    /// Anything else, including unfinished `.part` files, yields `None`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let id = name.strip_suffix(ARTIFACT_EXTENSION)?.strip_suffix('.')?;
        (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then(|| Self(id.to_string()))
    }

    /// The id as text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the cache file, `{id}.torrent`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, ARTIFACT_EXTENSION)
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a single item was resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// File was already in the cache; no request was made
    CachedExisting,
    /// File was downloaded during this call
    Downloaded,
    /// Item could not be cached
    Failed(DownloadFailure),
}

impl DownloadOutcome {
    /// `true` unless the item failed
    pub fn is_available(&self) -> bool {
        !matches!(self, DownloadOutcome::Failed(_))
    }
}

/// Per-item result of [`ArtifactCache::download_all`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadResult {
    /// Guid of the feed item
    pub guid: String,
    /// Artifact id, if the link carried one
    pub artifact_id: Option<ArtifactId>,
    /// Resolution of the item
    pub outcome: DownloadOutcome,
}

/// Counts of a [`download_all`](ArtifactCache::download_all) run, for logging
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Items already cached
    pub cached: usize,
    /// Items downloaded
    pub downloaded: usize,
    /// Items that failed
    pub failed: usize,
}

impl DownloadSummary {
    /// Tally a result list
    pub fn of(results: &[DownloadResult]) -> Self {
        results
            .iter()
            .fold(Self::default(), |mut summary, result| {
                match result.outcome {
                    DownloadOutcome::CachedExisting => summary.cached += 1,
                    DownloadOutcome::Downloaded => summary.downloaded += 1,
                    DownloadOutcome::Failed(_) => summary.failed += 1,
                }
                summary
            })
    }
}

/// Downloads feed artifacts into a local directory
pub struct ArtifactCache {
    context: ClientContext,
    cache_dir: PathBuf,
}

impl ArtifactCache {
    /// Create a cache rooted at `cache_dir`
    pub fn new(context: ClientContext, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            context,
            cache_dir: cache_dir.into(),
        }
    }

    /// Directory holding the cached artifacts
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Deterministic cache location of an artifact
    pub fn path_for(&self, id: &ArtifactId) -> PathBuf {
        self.cache_dir.join(id.file_name())
    }

    /// Resolve every item, sequentially and in input order
    ///
    /// Always returns exactly one result per input item.
    pub async fn download_all(&self, items: &[FeedItem]) -> Vec<DownloadResult> {
        if let Err(e) = tokio::fs::create_dir_all(&self.cache_dir).await {
            warn!(dir = %self.cache_dir.display(), error = %e, "Failed to create cache directory");
        }

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            results.push(self.download(item).await);
        }

        let summary = DownloadSummary::of(&results);
        info!(
            cached = summary.cached,
            downloaded = summary.downloaded,
            failed = summary.failed,
            "Artifact cache pass finished"
        );
        results
    }

    /// Resolve a single item
    pub async fn download(&self, item: &FeedItem) -> DownloadResult {
        let Some(id) = ArtifactId::from_link(&item.link) else {
            debug!(guid = %item.guid, link = %item.link, "Item link carries no artifact id");
            return DownloadResult {
                guid: item.guid.clone(),
                artifact_id: None,
                outcome: DownloadOutcome::Failed(DownloadFailure::NoArtifactId {
                    link: item.link.clone(),
                }),
            };
        };

        let path = self.path_for(&id);
        let outcome = if matches!(tokio::fs::try_exists(&path).await, Ok(true)) {
            debug!(artifact_id = %id, "Artifact already cached");
            DownloadOutcome::CachedExisting
        } else {
            match self.fetch_artifact(&id, &path).await {
                Ok(bytes) => {
                    info!(artifact_id = %id, bytes, "Downloaded artifact");
                    DownloadOutcome::Downloaded
                }
                Err(failure) => {
                    warn!(artifact_id = %id, error = %failure, "Artifact download failed");
                    DownloadOutcome::Failed(failure)
                }
            }
        };

        DownloadResult {
            guid: item.guid.clone(),
            artifact_id: Some(id),
            outcome,
        }
    }

    async fn fetch_artifact(&self, id: &ArtifactId, path: &Path) -> Result<u64, DownloadFailure> {
        let url = self
            .context
            .artifact_url(id.as_str())
            .map_err(|e| DownloadFailure::Network(e.to_string()))?;

        let response = self
            .context
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadFailure::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadFailure::Status(status.as_u16()));
        }

        write_stream(response.bytes_stream(), path).await
    }
}

/// Stream `body` into `path`, returning the number of bytes written
///
/// Data goes to a sibling `.part` file that is renamed over `path` only after
/// the stream ended and the file was synced. On any failure the `.part` file
/// is removed and nothing appears at `path`.
pub(crate) async fn write_stream<S, B, E>(body: S, path: &Path) -> Result<u64, DownloadFailure>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    write_stream_with(body, path, tokio::fs::File::create).await
}

/// Destination of an in-flight download
pub(crate) trait PartialSink: AsyncWrite + Unpin {
    /// Make the written bytes durable before the rename
    async fn sync(&mut self) -> std::io::Result<()>;
}

impl PartialSink for tokio::fs::File {
    async fn sync(&mut self) -> std::io::Result<()> {
        self.sync_all().await
    }
}

pub(crate) async fn write_stream_with<S, B, E, W, F, Fut>(
    body: S,
    path: &Path,
    open: F,
) -> Result<u64, DownloadFailure>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    W: PartialSink,
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = std::io::Result<W>>,
{
    let partial = partial_path(path);
    let result = match open(partial.clone()).await {
        Ok(sink) => copy_to(body, sink, &partial).await,
        Err(e) => Err(WriteFailure::new(&partial, &e).into()),
    };

    let result = match result {
        Ok(written) => tokio::fs::rename(&partial, path)
            .await
            .map(|()| written)
            .map_err(|e| DownloadFailure::from(WriteFailure::new(path, &e))),
        Err(failure) => Err(failure),
    };

    if result.is_err() {
        discard(&partial).await;
    }
    result
}

async fn copy_to<S, B, E, W>(body: S, mut sink: W, partial: &Path) -> Result<u64, DownloadFailure>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    W: PartialSink,
{
    let write_err = |e: std::io::Error| DownloadFailure::from(WriteFailure::new(partial, &e));

    let mut body = std::pin::pin!(body);
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| DownloadFailure::Network(e.to_string()))?;
        let bytes = chunk.as_ref();
        sink.write_all(bytes).await.map_err(write_err)?;
        written += bytes.len() as u64;
    }

    sink.flush().await.map_err(write_err)?;
    sink.sync().await.map_err(write_err)?;
    Ok(written)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn discard(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => debug!(path = %partial.display(), "Removed unfinished artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %partial.display(), error = %e, "Failed to remove unfinished artifact"),
    }
}
