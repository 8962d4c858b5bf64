//! Configuration types for feed-relay

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

/// Main configuration for [`FeedRelay`](crate::FeedRelay)
///
/// Fields are organized into logical sub-configs:
/// - [`upstream`](UpstreamConfig) - the site being mirrored, credentials, login flow
/// - [`poll`](PollConfig) - cycle interval and failure backoff
/// - [`cache`](CacheConfig) - where artifacts are stored
/// - [`output`](OutputFeedConfig) - static metadata of the republished feed
/// - [`api`](ApiConfig) - front door bind address
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream site settings
    pub upstream: UpstreamConfig,

    /// Poll loop timing
    #[serde(default)]
    pub poll: PollConfig,

    /// Artifact cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Republished feed settings
    #[serde(default)]
    pub output: OutputFeedConfig,

    /// Front door settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config {
            message: e.to_string(),
            key: None,
        })
    }

    /// Check the configuration for values the relay cannot work with
    pub fn validate(&self) -> Result<()> {
        let upstream = &self.upstream;
        upstream.base_url()?;
        if upstream.username.is_empty() {
            return Err(Error::config("upstream.username", "username is required"));
        }
        if upstream.password.is_empty() {
            return Err(Error::config("upstream.password", "password is required"));
        }
        if !upstream.artifact_path.contains(ARTIFACT_ID_PLACEHOLDER) {
            return Err(Error::config(
                "upstream.artifact_path",
                format!("must contain the {ARTIFACT_ID_PLACEHOLDER} placeholder"),
            ));
        }
        if upstream.session_cookie.is_empty() {
            return Err(Error::config(
                "upstream.session_cookie",
                "session cookie name is required",
            ));
        }
        if self.poll.check_interval.is_zero() {
            return Err(Error::config(
                "poll.check_interval",
                "must be greater than zero",
            ));
        }
        if self.poll.retry_backoff.is_zero() {
            return Err(Error::config(
                "poll.retry_backoff",
                "must be greater than zero",
            ));
        }
        url::Url::parse(&self.output.public_base_url)
            .map_err(|e| Error::config("output.public_base_url", e.to_string()))?;
        Ok(())
    }
}

/// Placeholder replaced by the artifact id in [`UpstreamConfig::artifact_path`]
pub const ARTIFACT_ID_PLACEHOLDER: &str = "{id}";

/// Upstream site configuration
///
/// All `*_path` values are resolved against `base_url`, so they may carry a
/// query string (`login.php?type=login`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Site root, e.g. `https://tracker.example/`
    pub base_url: String,

    /// Account username
    #[serde(default)]
    pub username: String,

    /// Account password
    #[serde(default)]
    pub password: String,

    /// Authenticated-only page used as liveness probe (default: site root)
    #[serde(default)]
    pub probe_path: String,

    /// Login page, loaded before posting credentials (default: "login.php")
    #[serde(default = "default_login_page_path")]
    pub login_page_path: String,

    /// Credential form endpoint (default: "login.php?type=login")
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Feed endpoint (default: "rss.php")
    #[serde(default = "default_feed_path")]
    pub feed_path: String,

    /// Artifact endpoint with an `{id}` placeholder (default: "download.php?id={id}")
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,

    /// Response header whose presence on the probe means "logged out" (default: "refresh")
    #[serde(default = "default_login_marker_header")]
    pub login_marker_header: String,

    /// Cookie that proves a successful login (default: "sid")
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Accept-Language sent with every request
    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Site-specific login sequence
    #[serde(default)]
    pub login_flow: LoginFlow,

    /// Per-request timeout (None = wait for the transport to give up)
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,
}

impl UpstreamConfig {
    /// Parsed `base_url`
    pub fn base_url(&self) -> Result<url::Url> {
        url::Url::parse(&self.base_url)
            .map_err(|e| Error::config("upstream.base_url", format!("{}: {}", self.base_url, e)))
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            probe_path: String::new(),
            login_page_path: default_login_page_path(),
            login_path: default_login_path(),
            feed_path: default_feed_path(),
            artifact_path: default_artifact_path(),
            login_marker_header: default_login_marker_header(),
            session_cookie: default_session_cookie(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            login_flow: LoginFlow::default(),
            request_timeout: None,
        }
    }
}

/// Login sequence variants supported by the session manager
///
/// Every variant ends with the credential form POST; they differ in what
/// happens before it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoginFlow {
    /// Post credentials straight away
    Direct,

    /// Load the login page, then post a browser fingerprint to an
    /// account-update endpoint to mint a session before logging in
    AccountUpdate {
        /// Account update endpoint (default: "account-upd.php")
        #[serde(default = "default_account_update_path")]
        path: String,
    },

    /// Load the login page, read the anti-forgery token from its cookies and
    /// echo it back in the login form
    CsrfToken {
        /// Cookie carrying the token (default: "csrfp_token")
        #[serde(default = "default_csrf_name")]
        cookie: String,
        /// Form field the token is submitted in (default: "csrfp_token")
        #[serde(default = "default_csrf_name")]
        field: String,
    },
}

impl Default for LoginFlow {
    fn default() -> Self {
        LoginFlow::AccountUpdate {
            path: default_account_update_path(),
        }
    }
}

/// Poll loop timing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between successful cycles (default: 10 minutes)
    #[serde(default = "default_check_interval", with = "duration_serde")]
    pub check_interval: Duration,

    /// Delay after a failed cycle (default: 5 minutes)
    #[serde(default = "default_retry_backoff", with = "duration_serde")]
    pub retry_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

/// Artifact cache settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding `{id}.torrent` files (default: "torrent-cache")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
        }
    }
}

/// Static metadata of the republished feed
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputFeedConfig {
    /// Channel title
    #[serde(default = "default_output_title")]
    pub title: String,

    /// Channel description
    #[serde(default = "default_output_description")]
    pub description: String,

    /// Channel link
    #[serde(default = "default_output_link")]
    pub link: String,

    /// Externally reachable address of the front door; item links become
    /// `{public_base_url}/torrent/{id}.torrent`
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for OutputFeedConfig {
    fn default() -> Self {
        Self {
            title: default_output_title(),
            description: default_output_description(),
            link: default_output_link(),
            public_base_url: default_public_base_url(),
        }
    }
}

/// Front door settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind (default: 127.0.0.1:3000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Allow cross-origin reads of the feed (default: false)
    #[serde(default)]
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: false,
        }
    }
}

fn default_login_page_path() -> String {
    "login.php".to_string()
}

fn default_login_path() -> String {
    "login.php?type=login".to_string()
}

fn default_feed_path() -> String {
    "rss.php".to_string()
}

fn default_artifact_path() -> String {
    "download.php?id={id}".to_string()
}

fn default_login_marker_header() -> String {
    "refresh".to_string()
}

fn default_session_cookie() -> String {
    "sid".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_6) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/66.0.3343.3 Safari/537.36"
        .to_string()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9,ja;q=0.8,zh-CN;q=0.7,zh;q=0.6".to_string()
}

fn default_account_update_path() -> String {
    "account-upd.php".to_string()
}

fn default_csrf_name() -> String {
    "csrfp_token".to_string()
}

fn default_check_interval() -> Duration {
    Duration::from_secs(600)
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(300)
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("torrent-cache")
}

fn default_output_title() -> String {
    "feed-relay".to_string()
}

fn default_output_description() -> String {
    "Mirrored feed with locally cached torrents".to_string()
}

fn default_output_link() -> String {
    "http://localhost:3000/feeds.rss".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
