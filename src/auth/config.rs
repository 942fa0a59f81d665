//! Service-specific login protocol settings.

use std::time::Duration;

use super::token::{DEFAULT_CSRF_COOKIE, DEFAULT_CSRF_FIELD, DEFAULT_CSRF_META};

/// Default lifetime of a session whose source gives no expiry (1 hour).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// How credentials are encoded in the submission body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionEncoding {
    /// `application/json`.
    Json,
    /// `application/x-www-form-urlencoded`.
    Form,
}

/// Endpoints, field names and cookie names of one login protocol.
///
/// The defaults describe the multi-step JSON login of the O'Reilly learning
/// platform: seed cookies from the unified login page, POST JSON credentials,
/// follow the returned redirect, then read the `orm-jwt` cookie.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Login entry point fetched to seed cookies and find the anti-forgery token.
    pub login_page_url: String,
    /// Credential submission endpoint.
    pub login_submit_url: String,
    /// Body encoding of the submission.
    pub submission_encoding: SubmissionEncoding,
    /// Field carrying the username.
    pub username_field: String,
    /// Field carrying the password.
    pub password_field: String,
    /// Where the service should send the browser after login, if it asks.
    pub redirect_uri: Option<String>,
    /// Whether to ask for a long-lived session.
    pub remember_me: bool,
    /// Cookie holding the session token once login is finalized.
    pub session_cookie_name: String,
    /// Cookie that may carry the anti-forgery token.
    pub csrf_cookie_name: String,
    /// Hidden form field that may carry the anti-forgery token.
    pub csrf_field_name: String,
    /// `<meta>` tag that may carry the anti-forgery token.
    pub csrf_meta_name: String,
    /// Header the anti-forgery token is echoed in.
    pub csrf_header_name: String,
    /// URL whose cookies are searched for the session cookie.
    pub cookie_url: String,
    /// Protected endpoint requested after login; `None` skips verification.
    pub verify_url: Option<String>,
    /// Fail the login when no anti-forgery token is found.
    pub require_anti_forgery_token: bool,
    /// Session lifetime when neither cookie nor response gives one.
    pub default_session_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            login_page_url: "https://learning.oreilly.com/login/unified/?next=/home/".to_string(),
            login_submit_url: "https://www.oreilly.com/member/auth/login/".to_string(),
            submission_encoding: SubmissionEncoding::Json,
            username_field: "email".to_string(),
            password_field: "password".to_string(),
            redirect_uri: Some("https://learning.oreilly.com/home/".to_string()),
            remember_me: false,
            session_cookie_name: "orm-jwt".to_string(),
            csrf_cookie_name: DEFAULT_CSRF_COOKIE.to_string(),
            csrf_field_name: DEFAULT_CSRF_FIELD.to_string(),
            csrf_meta_name: DEFAULT_CSRF_META.to_string(),
            csrf_header_name: "X-CSRFToken".to_string(),
            cookie_url: "https://learning.oreilly.com".to_string(),
            verify_url: Some("https://www.oreilly.com/member/profile/".to_string()),
            require_anti_forgery_token: false,
            default_session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

impl ServiceConfig {
    /// Rebases every endpoint onto `base` (scheme, host and port), keeping
    /// paths and queries. Used to point the protocol at a test server.
    #[must_use]
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let rebase = |url: &str| -> String {
            match url::Url::parse(url) {
                Ok(parsed) => {
                    let mut tail = parsed.path().to_string();
                    if let Some(query) = parsed.query() {
                        tail.push('?');
                        tail.push_str(query);
                    }
                    format!("{base}{tail}")
                }
                Err(_) => url.to_string(),
            }
        };
        self.login_page_url = rebase(&self.login_page_url);
        self.login_submit_url = rebase(&self.login_submit_url);
        self.redirect_uri = self.redirect_uri.as_deref().map(rebase);
        self.cookie_url = base.to_string();
        self.verify_url = self.verify_url.as_deref().map(rebase);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_describe_json_login() {
        let config = ServiceConfig::default();
        assert_eq!(config.submission_encoding, SubmissionEncoding::Json);
        assert_eq!(config.session_cookie_name, "orm-jwt");
        assert_eq!(config.default_session_ttl, Duration::from_secs(3600));
        assert!(!config.require_anti_forgery_token);
    }

    #[test]
    fn test_with_base_url_keeps_paths_and_queries() {
        let config = ServiceConfig::default().with_base_url("http://127.0.0.1:9000/");
        assert_eq!(
            config.login_page_url,
            "http://127.0.0.1:9000/login/unified/?next=/home/"
        );
        assert_eq!(config.login_submit_url, "http://127.0.0.1:9000/member/auth/login/");
        assert_eq!(config.cookie_url, "http://127.0.0.1:9000");
        assert_eq!(
            config.verify_url.as_deref(),
            Some("http://127.0.0.1:9000/member/profile/")
        );
    }
}
