//! Session verification and automatic re-authentication.
//!
//! The upstream site has no session API; login state is inferred from page
//! responses. A logged-out visitor gets a redirect-to-login header (the site
//! uses `Refresh`) on the authenticated-only probe page, and a successful
//! login is recognized by the session cookie in the credential POST response.
//!
//! Sites differ in what must happen before the credentials are posted, which
//! is captured by [`LoginFlow`]:
//!
//! | Flow              | Login page | Pre-login call                 | Extra form field |
//! |-------------------|------------|--------------------------------|------------------|
//! | `Direct`          | no         | no                             | no               |
//! | `AccountUpdate`   | yes        | POST fingerprint to `path`     | no               |
//! | `CsrfToken`       | yes        | no                             | token from cookie|

use crate::client::{ClientContext, set_cookie_value};
use crate::config::{LoginFlow, UpstreamConfig};
use crate::error::{AuthError, AuthStage, Error, Result};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, ORIGIN, REFERER};
use tracing::{debug, info};
use url::Url;

/// Outcome of [`SessionManager::ensure_authenticated`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Session is usable for feed and artifact requests
    pub authenticated: bool,
    /// A login sequence ran during this call
    pub refreshed: bool,
}

/// Verifies and restores the authenticated state of the shared [`ClientContext`]
///
/// Never retries within a call; a failed check or login is returned to the
/// poll loop, which retries on its own schedule.
pub struct SessionManager {
    context: ClientContext,
    username: String,
    password: String,
    flow: Flow,
    marker_header: HeaderName,
    session_cookie: String,
    fingerprint: String,
}

impl SessionManager {
    /// Create a session manager over a shared client context
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `login_marker_header` is not a valid header name
    pub fn new(context: ClientContext, upstream: &UpstreamConfig) -> Result<Self> {
        let marker_header = HeaderName::from_bytes(upstream.login_marker_header.as_bytes())
            .map_err(|e| Error::config("upstream.login_marker_header", e.to_string()))?;
        let flow = match &upstream.login_flow {
            LoginFlow::Direct => Flow::Direct,
            LoginFlow::AccountUpdate { path } => {
                let url = context.base_url().join(path).map_err(|e| {
                    Error::config("upstream.login_flow.path", format!("{path}: {e}"))
                })?;
                Flow::AccountUpdate(url)
            }
            LoginFlow::CsrfToken { cookie, field } => Flow::CsrfToken {
                cookie: cookie.clone(),
                field: field.clone(),
            },
        };

        Ok(Self {
            context,
            username: upstream.username.clone(),
            password: upstream.password.clone(),
            flow,
            marker_header,
            session_cookie: upstream.session_cookie.clone(),
            fingerprint: browser_fingerprint(),
        })
    }

    /// Make sure the shared context carries a live session, logging in if needed
    pub async fn ensure_authenticated(&self) -> std::result::Result<Session, AuthError> {
        if self.check_login_state().await? {
            debug!("Session still valid");
            return Ok(Session {
                authenticated: true,
                refreshed: false,
            });
        }

        info!(flow = ?self.flow, "Session expired, logging in");
        self.login().await?;
        info!("Logged in to upstream");

        Ok(Session {
            authenticated: true,
            refreshed: true,
        })
    }

    /// Probe the authenticated-only page; `true` when no login redirect came back
    pub async fn check_login_state(&self) -> std::result::Result<bool, AuthError> {
        let url = self.context.endpoints().probe.clone();
        let response = self
            .context
            .get(url)
            .send()
            .await
            .map_err(|source| AuthError::Network {
                stage: AuthStage::Probe,
                source,
            })?;
        expect_ok(AuthStage::Probe, response.status())?;

        Ok(!response.headers().contains_key(&self.marker_header))
    }

    async fn login(&self) -> std::result::Result<(), AuthError> {
        let csrf = match &self.flow {
            Flow::Direct => None,
            Flow::AccountUpdate(url) => {
                self.load_login_page().await?;
                self.account_update(url.clone()).await?;
                None
            }
            Flow::CsrfToken { cookie, field } => {
                let headers = self.load_login_page().await?;
                let token = set_cookie_value(&headers, cookie).ok_or_else(|| {
                    AuthError::MissingCsrfToken {
                        cookie: cookie.clone(),
                    }
                })?;
                debug!(cookie = %cookie, "Extracted CSRF token from login page");
                Some((field.as_str(), token))
            }
        };

        self.submit_credentials(csrf).await
    }

    /// GET the login page so the site can hand out its bootstrap cookies
    async fn load_login_page(&self) -> std::result::Result<HeaderMap, AuthError> {
        let url = self.context.endpoints().login_page.clone();
        let response = self
            .context
            .get(url)
            .send()
            .await
            .map_err(|source| AuthError::Network {
                stage: AuthStage::LoginPage,
                source,
            })?;
        expect_ok(AuthStage::LoginPage, response.status())?;
        Ok(response.headers().clone())
    }

    async fn account_update(&self, url: Url) -> std::result::Result<(), AuthError> {
        let response = self
            .context
            .post(url)
            .form(&[("f", self.fingerprint.as_str())])
            .header(REFERER, self.context.endpoints().login_page.as_str())
            .header(ORIGIN, self.context.origin())
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await
            .map_err(|source| AuthError::Network {
                stage: AuthStage::AccountUpdate,
                source,
            })?;
        expect_ok(AuthStage::AccountUpdate, response.status())
    }

    async fn submit_credentials(
        &self,
        csrf: Option<(&str, String)>,
    ) -> std::result::Result<(), AuthError> {
        let mut form = vec![
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("do", "login"),
            ("language", ""),
        ];
        if let Some((field, token)) = &csrf {
            form.push((*field, token.as_str()));
        }

        let url = self.context.endpoints().login.clone();
        let response = self
            .context
            .post(url)
            .form(&form)
            .header(REFERER, self.context.endpoints().login_page.as_str())
            .header(ORIGIN, self.context.origin())
            .send()
            .await
            .map_err(|source| AuthError::Network {
                stage: AuthStage::Login,
                source,
            })?;
        expect_ok(AuthStage::Login, response.status())?;

        match set_cookie_value(response.headers(), &self.session_cookie) {
            Some(_) => Ok(()),
            None => Err(AuthError::Rejected {
                cookie: self.session_cookie.clone(),
            }),
        }
    }
}

/// [`LoginFlow`] with its endpoints resolved
#[derive(Debug)]
enum Flow {
    Direct,
    AccountUpdate(Url),
    CsrfToken { cookie: String, field: String },
}

fn expect_ok(stage: AuthStage, status: StatusCode) -> std::result::Result<(), AuthError> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(AuthError::UnexpectedStatus {
            stage,
            status: status.as_u16(),
        })
    }
}

/// Random 32-hex-digit browser fingerprint, fixed for the life of the process
fn browser_fingerprint() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
