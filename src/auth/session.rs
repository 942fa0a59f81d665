//! Session handle, credentials and the clock used to judge expiry.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::cookies::Cookie;

/// Source of the current time.
///
/// Session validity and cookie expiry are judged through this trait so tests
/// can move time explicitly.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta: TimeDelta) {
        self.millis
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Username and password, held only for the duration of a login attempt.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The account name (email address for most services).
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password. Never log the return value.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// An authenticated session: bearer token, validity window and cookie snapshot.
///
/// A session is usable while [`Session::is_valid_at`] holds, which requires a
/// non-empty header-safe token, `expires_at > issued_at`, and `now < expires_at`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    token: String,
    token_type: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    cookies: Vec<Cookie>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

impl Session {
    /// Creates a session with no cookies.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        token_type: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            token_type: token_type.into(),
            issued_at,
            expires_at,
            cookies: Vec::new(),
            username: None,
        }
    }

    /// Attaches the cookie snapshot.
    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Records the account the session belongs to.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// The session token. Never log the return value.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Token scheme, usually `Bearer`.
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// When the session was established.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When the session stops being usable.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Cookies captured while the session was established.
    #[must_use]
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// The account name, if known.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Validity against the wall clock.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Validity against an injected clock.
    #[must_use]
    pub fn is_valid_with(&self, clock: &dyn Clock) -> bool {
        self.is_valid_at(clock.now())
    }

    /// Validity at a given instant.
    ///
    /// The token travels in `Authorization` and `Cookie` headers, so it must
    /// be visible ASCII without `;`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        is_header_safe(&self.token) && self.expires_at > self.issued_at && now < self.expires_at
    }

    /// Time left before expiry, or `None` once expired.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        let remaining = self.expires_at - now;
        (remaining > TimeDelta::zero()).then_some(remaining)
    }
}

fn is_header_safe(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_graphic() && c != ';')
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("cookies", &self.cookies.len())
            .field("username", &self.username)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_session_valid_only_inside_window() {
        let session = Session::new("tok", "Bearer", at(100), at(200));
        assert!(session.is_valid_at(at(100)));
        assert!(session.is_valid_at(at(199)));
        assert!(!session.is_valid_at(at(200)));
        assert!(!session.is_valid_at(at(500)));
    }

    #[test]
    fn test_session_invalid_when_token_empty_or_window_inverted() {
        assert!(!Session::new("", "Bearer", at(100), at(200)).is_valid_at(at(150)));
        assert!(!Session::new("tok", "Bearer", at(200), at(200)).is_valid_at(at(100)));
        assert!(!Session::new("tok", "Bearer", at(300), at(200)).is_valid_at(at(100)));
    }

    #[test]
    fn test_session_invalid_when_token_cannot_be_sent_as_header() {
        for token in ["bad\ntoken", "two words", "caf\u{e9}", "a;b=c"] {
            let session = Session::new(token, "Bearer", at(100), at(200));
            assert!(!session.is_valid_at(at(150)), "{token:?} accepted");
        }
        assert!(Session::new("eyJ.a-b_c=", "Bearer", at(100), at(200)).is_valid_at(at(150)));
    }

    #[test]
    fn test_manual_clock_drives_validity() {
        let clock = ManualClock::new(at(1_000));
        let session = Session::new("tok", "Bearer", at(1_000), at(4_600));
        assert!(session.is_valid_with(&clock));

        clock.advance(TimeDelta::seconds(3_599));
        assert!(session.is_valid_with(&clock));

        clock.advance(TimeDelta::seconds(1));
        assert!(!session.is_valid_with(&clock));

        clock.set(at(2_000));
        assert!(session.is_valid_with(&clock));
    }

    #[test]
    fn test_remaining_at() {
        let session = Session::new("tok", "Bearer", at(0), at(60));
        assert_eq!(session.remaining_at(at(15)), Some(TimeDelta::seconds(45)));
        assert_eq!(session.remaining_at(at(60)), None);
    }

    #[test]
    fn test_session_serde_round_trip_keeps_cookies_and_username() {
        let session = Session::new("tok", "Bearer", at(0), at(3600))
            .with_cookies(vec![Cookie::new(".e.com", true, "/", true, None, "orm-jwt", "tok")])
            .with_username("reader@example.com");
        let json = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn test_session_deserializes_without_optional_fields() {
        let json = r#"{"token":"t","token_type":"Bearer",
            "issued_at":"2026-01-01T00:00:00Z","expires_at":"2026-01-01T01:00:00Z"}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert!(session.cookies().is_empty());
        assert_eq!(session.username(), None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let session = Session::new("very-secret", "Bearer", at(0), at(1));
        assert!(!format!("{session:?}").contains("very-secret"));

        let credentials = Credentials::new("me@example.com", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("me@example.com"));
    }
}
