//! Cookie-bearing HTTP context shared by every pipeline stage.
//!
//! One cookie jar backs two `reqwest` clients: a browsing client that follows
//! redirects (probe, feed and artifact GETs) and a form client that never
//! does, so the `Set-Cookie` headers of a login POST stay observable. Cookies
//! set on either client are sent by both.

use crate::config::{ARTIFACT_ID_PLACEHOLDER, UpstreamConfig};
use crate::error::{Error, Result};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use std::sync::Arc;
use url::Url;

/// Accept header of a desktop browser navigating to a page
pub(crate) const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";

/// Upstream URLs resolved once against the configured base URL
#[derive(Clone, Debug)]
pub struct Endpoints {
    /// Authenticated-only page used as liveness probe
    pub probe: Url,
    /// Login page
    pub login_page: Url,
    /// Credential form endpoint
    pub login: Url,
    /// Feed endpoint
    pub feed: Url,
}

/// Persistent request context for one upstream site
///
/// Cloning is cheap and every clone shares the same cookie jar, so a login
/// performed through one clone authenticates all of them.
#[derive(Clone)]
pub struct ClientContext {
    client: reqwest::Client,
    form_client: reqwest::Client,
    jar: Arc<Jar>,
    base_url: Url,
    endpoints: Arc<Endpoints>,
    artifact_path: Arc<str>,
}

impl ClientContext {
    /// Build the context for an upstream site
    ///
    /// # Errors
    /// Returns [`Error::Config`] when the base URL or an endpoint path does not
    /// resolve, and [`Error::Network`] when a client cannot be built.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self> {
        let base_url = upstream.base_url()?;
        let resolve = |key: &str, path: &str| {
            base_url
                .join(path)
                .map_err(|e| Error::config(key, format!("{path}: {e}")))
        };
        let endpoints = Endpoints {
            probe: resolve("upstream.probe_path", &upstream.probe_path)?,
            login_page: resolve("upstream.login_page_path", &upstream.login_page_path)?,
            login: resolve("upstream.login_path", &upstream.login_path)?,
            feed: resolve("upstream.feed_path", &upstream.feed_path)?,
        };

        let jar = Arc::new(Jar::default());
        let headers = browser_headers(upstream)?;

        let mut client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .default_headers(headers.clone())
            .gzip(true);
        let mut form_client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .default_headers(headers)
            .redirect(Policy::none())
            .gzip(true);
        if let Some(timeout) = upstream.request_timeout {
            client = client.timeout(timeout);
            form_client = form_client.timeout(timeout);
        }

        let context = Self {
            client: client.build()?,
            form_client: form_client.build()?,
            jar,
            base_url,
            endpoints: Arc::new(endpoints),
            artifact_path: Arc::from(upstream.artifact_path.as_str()),
        };
        // Fail at startup rather than on the first download
        context
            .artifact_url("0")
            .map_err(|e| Error::config("upstream.artifact_path", e.to_string()))?;
        Ok(context)
    }

    /// Site root
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Scheme, host and port of the site, as sent in `Origin`
    pub fn origin(&self) -> String {
        self.base_url.origin().ascii_serialization()
    }

    /// Resolved upstream endpoints
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Download URL of one artifact
    pub fn artifact_url(&self, artifact_id: &str) -> std::result::Result<Url, url::ParseError> {
        let path = self
            .artifact_path
            .replace(ARTIFACT_ID_PLACEHOLDER, artifact_id);
        self.base_url.join(&path)
    }

    /// GET through the redirect-following client
    pub fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.client.get(url)
    }

    /// POST through the non-redirecting client
    pub fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.form_client.post(url)
    }

    /// `Cookie` header the jar would send to the site root
    pub fn cookie_header(&self) -> Option<String> {
        self.jar
            .cookies(&self.base_url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("base_url", &self.base_url.as_str())
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

fn browser_headers(upstream: &UpstreamConfig) -> Result<HeaderMap> {
    let value = |key: &str, raw: &str| {
        HeaderValue::from_str(raw).map_err(|e| Error::config(key, e.to_string()))
    };
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        value("upstream.accept_language", &upstream.accept_language)?,
    );
    headers.insert(
        header::USER_AGENT,
        value("upstream.user_agent", &upstream.user_agent)?,
    );
    Ok(headers)
}

/// Value of the first `Set-Cookie` header that sets `name` to a non-empty value
pub(crate) fn set_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?;
            let (key, value) = pair.split_once('=')?;
            let value = value.trim();
            (key.trim() == name && !value.is_empty()).then(|| value.to_string())
        })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(base_url: &str) -> UpstreamConfig {
        UpstreamConfig {
            base_url: base_url.to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn endpoints_resolve_against_base_url() {
        let context = ClientContext::new(&upstream("https://tracker.example/")).unwrap();
        let endpoints = context.endpoints();

        assert_eq!(endpoints.probe.as_str(), "https://tracker.example/");
        assert_eq!(endpoints.login_page.as_str(), "https://tracker.example/login.php");
        assert_eq!(
            endpoints.login.as_str(),
            "https://tracker.example/login.php?type=login"
        );
        assert_eq!(endpoints.feed.as_str(), "https://tracker.example/rss.php");
        assert_eq!(context.origin(), "https://tracker.example");
    }

    #[test]
    fn artifact_url_substitutes_id() {
        let context = ClientContext::new(&upstream("https://tracker.example/")).unwrap();
        assert_eq!(
            context.artifact_url("4711").unwrap().as_str(),
            "https://tracker.example/download.php?id=4711"
        );
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = ClientContext::new(&upstream("::nope")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn set_cookie_value_matches_exact_name() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("PHPSESSID=abc; path=/"),
        );
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("sid=deadbeef; path=/; HttpOnly"),
        );

        assert_eq!(set_cookie_value(&headers, "sid").as_deref(), Some("deadbeef"));
        assert_eq!(set_cookie_value(&headers, "PHPSESSID").as_deref(), Some("abc"));
        assert_eq!(set_cookie_value(&headers, "uid"), None);
    }

    #[test]
    fn set_cookie_value_ignores_cleared_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("sid=; expires=Thu, 01 Jan 1970 00:00:00 GMT"),
        );
        assert_eq!(set_cookie_value(&headers, "sid"), None);
    }
}
