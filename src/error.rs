//! Error types for feed-relay
//!
//! This module provides error handling for the relay, including:
//! - Cycle-fatal errors ([`AuthError`], [`FetchError`]) that abort a poll cycle
//! - Per-item failures ([`DownloadFailure`], [`WriteFailure`]) that are absorbed
//!   into a [`DownloadResult`](crate::cache::DownloadResult) and never abort a cycle
//! - A crate-wide [`Error`] with a [`Result`] alias

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for feed-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feed-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "upstream.base_url")
        key: Option<String>,
    },

    /// Session could not be verified or restored
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Feed could not be retrieved or parsed
    #[error("feed error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error outside of a pipeline stage (client construction etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Front door server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a config key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Login step that produced an [`AuthError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    /// Liveness probe against the authenticated-only page
    Probe,
    /// Loading the login page (cookie / CSRF token bootstrap)
    LoginPage,
    /// Pre-login account update side call
    AccountUpdate,
    /// Credential form submission
    Login,
}

impl std::fmt::Display for AuthStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuthStage::Probe => "liveness probe",
            AuthStage::LoginPage => "login page",
            AuthStage::AccountUpdate => "account update",
            AuthStage::Login => "login",
        };
        f.write_str(name)
    }
}

/// Session verification / login failures. Always fatal to the current cycle.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Transport-level failure while talking to the upstream site
    #[error("{stage} request failed: {source}")]
    Network {
        /// Step that failed
        stage: AuthStage,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a status other than 200
    #[error("{stage} returned unexpected status {status}")]
    UnexpectedStatus {
        /// Step that failed
        stage: AuthStage,
        /// HTTP status code received
        status: u16,
    },

    /// Login page did not hand out the expected anti-forgery cookie
    #[error("login page did not set CSRF cookie '{cookie}'")]
    MissingCsrfToken {
        /// Name of the cookie that was expected
        cookie: String,
    },

    /// Credentials were submitted but no session cookie came back
    #[error("login rejected: no '{cookie}' cookie in response")]
    Rejected {
        /// Name of the session cookie that was expected
        cookie: String,
    },
}

/// Feed retrieval failures. Fatal to the current cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Transport-level failure
    #[error("feed request failed: {0}")]
    Network(String),

    /// Feed endpoint answered with a non-200 status
    #[error("status code wrong: {0}")]
    Status(u16),

    /// Body was not a parsable RSS document
    #[error("feed parse error: {0}")]
    Parse(String),
}

/// Per-item download failure, recorded in the item's result
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadFailure {
    /// Item link carries no artifact id, nothing was requested
    #[error("link has no artifact id: {link}")]
    NoArtifactId {
        /// The link that failed to match
        link: String,
    },

    /// Transport-level failure while requesting or streaming the artifact
    #[error("artifact request failed: {0}")]
    Network(String),

    /// Artifact endpoint answered with a non-success status
    #[error("artifact endpoint returned status {0}")]
    Status(u16),

    /// Writing the artifact to the cache failed (partial file removed)
    #[error(transparent)]
    Write(#[from] WriteFailure),
}

/// Cache I/O failure. The partially written file has been removed by the time
/// this value exists.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to write {path}: {message}")]
pub struct WriteFailure {
    /// Path that was being written
    pub path: PathBuf,
    /// Description of the underlying I/O error
    pub message: String,
}

impl WriteFailure {
    pub(crate) fn new(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
