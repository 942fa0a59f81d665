//! The login state machine.
//!
//! ```text
//! Unauthenticated -> FetchingLoginForm -> SubmittingCredentials
//!     -> AwaitingFinalization -> Authenticated
//!            \___________\______________\_____-> Failed(reason)
//! ```
//!
//! `AwaitingFinalization` is skipped when the submission returns no redirect
//! target. An unexpired persisted session skips the whole sequence.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::cookie::CookieStore;
use reqwest::header::SET_COOKIE;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::capture::parse_captured_cookies;
use super::config::{ServiceConfig, SubmissionEncoding};
use super::cookies::{Cookie, load_cookies_into_jar, parse_set_cookie};
use super::error::{AuthError, LoginStage};
use super::session::{Clock, Credentials, Session, SystemClock};
use super::storage::SessionStore;
use super::token::{LoginPage, TokenExtractor, default_extractors, run_extractors};
use crate::transport::{HttpRequest, Transport, read_text};

/// Accept header of the credential submission (an XHR on the real site).
const SUBMISSION_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

/// Final-URL fragments showing the verification request was bounced to a sign-in page.
const LOGIN_PATTERNS: &[&str] = &["/login", "/signin", "/sign-in", "/auth/", "/sso", "/oauth"];

/// Where the login sequence currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    /// No session.
    Unauthenticated,
    /// Fetching the login entry point.
    FetchingLoginForm,
    /// Posting credentials.
    SubmittingCredentials,
    /// Following the redirect that finalizes the session cookie.
    AwaitingFinalization,
    /// A usable session exists.
    Authenticated,
    /// The last attempt failed.
    Failed {
        /// Rendered error of the failure.
        reason: String,
    },
}

/// Body of a successful credential submission, when it is JSON.
#[derive(Debug, Default, Deserialize)]
struct SubmissionResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    redirect_uri: Option<String>,
    expires_in: Option<i64>,
}

/// Establishes, restores and discards sessions for one account.
///
/// Logins are serialized by an internal lock, so concurrent callers sharing
/// one manager never interleave their state transitions.
#[derive(Debug)]
pub struct SessionManager {
    transport: Arc<Transport>,
    config: ServiceConfig,
    store: Option<SessionStore>,
    clock: Arc<dyn Clock>,
    extractors: Vec<Box<dyn TokenExtractor>>,
    state: Mutex<LoginState>,
    login_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    /// Creates a manager with no persistence, the wall clock, and the
    /// default token strategies for `config`.
    #[must_use]
    pub fn new(transport: Arc<Transport>, config: ServiceConfig) -> Self {
        let extractors = default_extractors(
            &config.csrf_cookie_name,
            &config.csrf_field_name,
            &config.csrf_meta_name,
        );
        Self {
            transport,
            config,
            store: None,
            clock: Arc::new(SystemClock),
            extractors,
            state: Mutex::new(LoginState::Unauthenticated),
            login_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Persists sessions to `store` and restores them from it.
    #[must_use]
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Judges expiry with `clock` instead of the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the anti-forgery token strategies; they are tried in order.
    #[must_use]
    pub fn with_extractors(mut self, extractors: Vec<Box<dyn TokenExtractor>>) -> Self {
        self.extractors = extractors;
        self
    }

    /// The current state of the login sequence.
    #[must_use]
    pub fn state(&self) -> LoginState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The protocol settings.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn transition(&self, next: LoginState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(from = ?*state, to = ?next, "login state transition");
        *state = next;
    }

    /// Returns the persisted session if it is still valid, loading its
    /// cookies into the transport's jar.
    ///
    /// Unreadable session files are logged and treated as absent.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        let session = self.load_valid_session()?;
        self.adopt(&session);
        Some(session)
    }

    /// Reads the persisted session if it is still valid. Touches neither the
    /// cookie jar nor the login state.
    fn load_valid_session(&self) -> Option<Session> {
        let store = self.store.as_ref()?;
        let session = match store.load() {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(error) => {
                warn!(error = %error, "ignoring unreadable session file");
                return None;
            }
        };
        if !session.is_valid_with(self.clock.as_ref()) {
            debug!(expires_at = %session.expires_at(), "persisted session has expired");
            return None;
        }
        Some(session)
    }

    fn adopt(&self, session: &Session) {
        load_cookies_into_jar(self.transport.cookie_jar(), session.cookies());
        self.transition(LoginState::Authenticated);
    }

    /// Logs in with `credentials`, or returns the persisted session for the
    /// same account if it is still valid.
    ///
    /// # Errors
    ///
    /// Returns one of the [`AuthError`] kinds; the state becomes
    /// [`LoginState::Failed`] with the rendered error.
    #[instrument(skip(self, cancel, credentials), fields(username = %credentials.username()))]
    pub async fn login(
        &self,
        cancel: &CancellationToken,
        credentials: &Credentials,
    ) -> Result<Session, AuthError> {
        let _login = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AuthError::Cancelled),
            guard = self.login_lock.lock() => guard,
        };

        if let Some(session) = self.load_valid_session() {
            let same_account = session
                .username()
                .is_none_or(|name| name.eq_ignore_ascii_case(credentials.username()));
            if same_account {
                self.adopt(&session);
                info!(expires_at = %session.expires_at(), "reusing persisted session");
                return Ok(session);
            }
            debug!("persisted session belongs to another account, logging in afresh");
        }

        match self.run_login(cancel, credentials).await {
            Ok(session) => {
                self.persist(&session);
                self.transition(LoginState::Authenticated);
                info!(expires_at = %session.expires_at(), "login succeeded");
                Ok(session)
            }
            Err(error) => {
                warn!(error = %error, "login failed");
                self.transition(LoginState::Failed {
                    reason: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Builds a session from an externally captured cookie set (Netscape or
    /// JSON export), bypassing the login sequence.
    ///
    /// The named session cookie supplies the token; its expiry, or the
    /// default TTL when it has none, becomes the session expiry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CookieImport`] if the input is unusable and
    /// [`AuthError::SessionTokenNotFound`] if the session cookie is missing.
    #[instrument(skip(self, source))]
    pub fn import_session(&self, source: &str) -> Result<Session, AuthError> {
        let now = self.clock.now();
        let captured = parse_captured_cookies(source, now)?;
        for warning in &captured.warnings {
            warn!(warning = %warning, "cookie import warning");
        }

        let Some(session_cookie) = captured
            .cookies
            .iter()
            .rev()
            .find(|cookie| cookie.name == self.config.session_cookie_name)
        else {
            return Err(AuthError::SessionTokenNotFound {
                cookie: self.config.session_cookie_name.clone(),
            });
        };

        let expires_at = session_cookie
            .expires
            .unwrap_or_else(|| now + self.default_ttl());
        let session = Session::new(session_cookie.value(), "Bearer", now, expires_at)
            .with_cookies(captured.cookies.clone());

        load_cookies_into_jar(self.transport.cookie_jar(), session.cookies());
        self.persist(&session);
        self.transition(LoginState::Authenticated);
        info!(
            cookies = session.cookies().len(),
            expires_at = %session.expires_at(),
            "session imported"
        );
        Ok(session)
    }

    /// Deletes the persisted session and resets the state machine.
    ///
    /// Returns `true` if a session file was removed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the file exists but cannot be removed.
    pub fn logout(&self) -> Result<bool, AuthError> {
        let removed = match &self.store {
            Some(store) => store.clear()?,
            None => false,
        };
        self.transition(LoginState::Unauthenticated);
        info!(removed, "logged out");
        Ok(removed)
    }

    fn persist(&self, session: &Session) {
        if let Some(store) = &self.store {
            if let Err(error) = store.save(session) {
                warn!(error = %error, "session obtained but could not be persisted");
            }
        }
    }

    fn default_ttl(&self) -> TimeDelta {
        TimeDelta::from_std(self.config.default_session_ttl).unwrap_or(TimeDelta::hours(1))
    }

    async fn run_login(
        &self,
        cancel: &CancellationToken,
        credentials: &Credentials,
    ) -> Result<Session, AuthError> {
        let mut seen_cookies: Vec<Cookie> = Vec::new();

        // Login form: seed cookies, find the anti-forgery token.
        self.transition(LoginState::FetchingLoginForm);
        let page_url = self.config.login_page_url.as_str();
        let response = self
            .transport
            .execute(cancel, &HttpRequest::get(page_url))
            .await?;
        self.capture_set_cookies(&response, &mut seen_cookies);
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::UnexpectedStatus {
                stage: LoginStage::LoginForm,
                status: status.as_u16(),
            });
        }
        let body = read_text(cancel, response).await?;

        let mut page_cookies = self.jar_cookies(page_url);
        page_cookies.extend(seen_cookies.iter().cloned());
        let page = LoginPage {
            body: &body,
            cookies: &page_cookies,
        };
        let csrf_token = match run_extractors(&self.extractors, &page) {
            Some((token, strategy)) => {
                debug!(strategy, "anti-forgery token found");
                Some(token)
            }
            None if self.config.require_anti_forgery_token => {
                return Err(AuthError::AntiForgeryTokenNotFound {
                    url: page_url.to_string(),
                });
            }
            None => {
                debug!("no anti-forgery token on login page, continuing without one");
                None
            }
        };

        // Credential submission: sent exactly once.
        self.transition(LoginState::SubmittingCredentials);
        let request = self.submission_request(credentials, csrf_token.as_deref());
        let response = self.transport.execute(cancel, &request).await?;
        self.capture_set_cookies(&response, &mut seen_cookies);
        let status = response.status();
        let final_url = response.url().clone();
        let body = read_text(cancel, response).await?;
        if !status.is_success() {
            return Err(classify_submission_failure(status.as_u16(), &body));
        }
        let submission: SubmissionResponse = serde_json::from_str(&body).unwrap_or_default();
        let issued_at = self.clock.now();

        // Finalization: let the server set the durable session cookie.
        if let Some(redirect) = submission.redirect_uri.as_deref().filter(|r| !r.is_empty()) {
            self.transition(LoginState::AwaitingFinalization);
            let target = final_url
                .join(redirect)
                .map_or_else(|_| redirect.to_string(), String::from);
            let response = self
                .transport
                .execute(cancel, &HttpRequest::get(target.as_str()))
                .await?;
            self.capture_set_cookies(&response, &mut seen_cookies);
            if !response.status().is_success() {
                warn!(
                    status = response.status().as_u16(),
                    "finalization returned non-success status, continuing"
                );
            }
        }

        let session = self.resolve_session(&submission, seen_cookies, issued_at)?;
        let session = session.with_username(credentials.username());

        if let Some(verify_url) = self.config.verify_url.as_deref() {
            self.verify(cancel, &session, verify_url).await?;
        }
        Ok(session)
    }

    fn submission_request(&self, credentials: &Credentials, csrf_token: Option<&str>) -> HttpRequest {
        let config = &self.config;
        let mut fields: Vec<(&str, &str)> = vec![
            (config.username_field.as_str(), credentials.username()),
            (config.password_field.as_str(), credentials.password()),
        ];
        if let Some(redirect) = config.redirect_uri.as_deref() {
            fields.push(("redirect_uri", redirect));
        }
        if let Some(token) = csrf_token {
            fields.push((config.csrf_field_name.as_str(), token));
        }

        let request = HttpRequest::post(config.login_submit_url.as_str())
            .header("accept", SUBMISSION_ACCEPT)
            .header("referer", &config.login_page_url);
        let request = match config.submission_encoding {
            SubmissionEncoding::Json => {
                let mut body = serde_json::Map::new();
                for (key, value) in &fields {
                    body.insert((*key).to_string(), serde_json::Value::from(*value));
                }
                if config.remember_me {
                    body.insert("remember_me".to_string(), serde_json::Value::Bool(true));
                }
                request.json(&serde_json::Value::Object(body))
            }
            SubmissionEncoding::Form => {
                if config.remember_me {
                    fields.push(("remember_me", "true"));
                }
                request.form(fields)
            }
        };
        let request = match csrf_token {
            Some(token) => request.header(&config.csrf_header_name, token),
            None => request,
        };
        request.non_idempotent()
    }

    /// Session cookie first, bearer token second.
    ///
    /// Only a session cookie set during this login counts; one already in
    /// the jar may belong to an earlier session or another account.
    fn resolve_session(
        &self,
        submission: &SubmissionResponse,
        seen_cookies: Vec<Cookie>,
        issued_at: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let cookie_name = self.config.session_cookie_name.as_str();
        let mut jar = self.jar_cookies(&self.config.cookie_url);
        jar.retain(|cookie| cookie.name != cookie_name);
        let mut cookies = merge_cookies(jar, seen_cookies);
        cookies.retain(|cookie| !cookie.is_expired_at(issued_at));

        let fallback_expiry = submission
            .expires_in
            .filter(|secs| *secs > 0)
            .and_then(TimeDelta::try_seconds)
            .unwrap_or_else(|| self.default_ttl());

        let (token, expires_at, source) =
            match cookies.iter().rev().find(|cookie| cookie.name == cookie_name) {
                Some(cookie) => (
                    cookie.value().to_string(),
                    cookie.expires.unwrap_or(issued_at + fallback_expiry),
                    "cookie",
                ),
                None => match submission.access_token.as_deref().filter(|t| !t.is_empty()) {
                    Some(token) => (token.to_string(), issued_at + fallback_expiry, "bearer"),
                    None => {
                        return Err(AuthError::SessionTokenNotFound {
                            cookie: cookie_name.to_string(),
                        });
                    }
                },
            };
        debug!(source, expires_at = %expires_at, "session token resolved");

        let token_type = submission
            .token_type
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Bearer".to_string());
        Ok(Session::new(token, token_type, issued_at, expires_at).with_cookies(cookies))
    }

    async fn verify(
        &self,
        cancel: &CancellationToken,
        session: &Session,
        verify_url: &str,
    ) -> Result<(), AuthError> {
        let request = HttpRequest::get(verify_url).bearer(session.token());
        let response = self.transport.execute(cancel, &request).await?;
        let status = response.status().as_u16();
        let final_url = response.url().as_str().to_ascii_lowercase();
        let body = read_text(cancel, response).await?;
        classify_verification(status, &final_url, &body)
    }

    fn capture_set_cookies(&self, response: &reqwest::Response, seen: &mut Vec<Cookie>) {
        let now = self.clock.now();
        for value in response.headers().get_all(SET_COOKIE) {
            let Ok(header) = value.to_str() else {
                continue;
            };
            if let Some(cookie) = parse_set_cookie(header, response.url(), now) {
                debug!(name = %cookie.name, domain = %cookie.domain, "captured cookie");
                seen.push(cookie);
            }
        }
    }

    /// Cookies the jar would send to `url`. The jar exposes only name and
    /// value, so scope is the URL host and expiry is unknown.
    fn jar_cookies(&self, url: &str) -> Vec<Cookie> {
        let Ok(url) = Url::parse(url) else {
            return Vec::new();
        };
        let Some(host) = url.host_str() else {
            return Vec::new();
        };
        let Some(header) = self.transport.cookie_jar().cookies(&url) else {
            return Vec::new();
        };
        let Ok(header) = header.to_str() else {
            return Vec::new();
        };
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, value)| {
                Cookie::new(host, false, "/", url.scheme() == "https", None, name, value)
            })
            .collect()
    }
}

/// Cookies seen in `Set-Cookie` headers carry expiry, so they replace the
/// jar's view of the same name.
fn merge_cookies(jar: Vec<Cookie>, seen: Vec<Cookie>) -> Vec<Cookie> {
    let mut merged: Vec<Cookie> = jar
        .into_iter()
        .filter(|cookie| !seen.iter().any(|s| s.name == cookie.name))
        .collect();
    for cookie in seen {
        merged.retain(|existing| !(existing.name == cookie.name && existing.domain == cookie.domain));
        merged.push(cookie);
    }
    merged
}

fn classify_submission_failure(status: u16, body: &str) -> AuthError {
    let lowered = body.to_ascii_lowercase();
    if lowered.contains("inactive") {
        return AuthError::AccountInactive;
    }
    if lowered.contains("incorrect")
        || lowered.contains("invalid")
        || matches!(status, 400 | 401 | 403)
    {
        return AuthError::InvalidCredentials;
    }
    AuthError::UnexpectedStatus {
        stage: LoginStage::Submission,
        status,
    }
}

fn classify_verification(status: u16, final_url: &str, body: &str) -> Result<(), AuthError> {
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.contains(r#""user_type":"Expired""#) {
        return Err(AuthError::SubscriptionExpired);
    }
    if compact.contains(r#""is_active":false"#) {
        return Err(AuthError::AccountInactive);
    }
    if matches!(status, 401 | 403) {
        return Err(AuthError::VerificationFailed {
            reason: format!("verification returned HTTP {status}"),
        });
    }
    if let Some(pattern) = LOGIN_PATTERNS.iter().find(|p| final_url.contains(*p)) {
        return Err(AuthError::VerificationFailed {
            reason: format!("verification was redirected to a sign-in page ({pattern})"),
        });
    }
    if status >= 400 {
        return Err(AuthError::UnexpectedStatus {
            stage: LoginStage::Verification,
            status,
        });
    }
    Ok(())
}
