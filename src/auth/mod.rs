//! Authentication: the login state machine, cookie import and session persistence.
//!
//! A [`SessionManager`] either drives the multi-step login against the
//! service or builds a [`Session`] from an exported browser cookie set.
//! Sessions are persisted through a [`SessionStore`] and reused until they
//! expire.

mod capture;
mod config;
mod cookies;
mod error;
mod manager;
mod session;
mod storage;
mod token;

pub use capture::{
    CaptureError, CapturedCookieFormat, CapturedCookies, parse_captured_cookies,
    unique_domain_count,
};
pub use config::{DEFAULT_SESSION_TTL, ServiceConfig, SubmissionEncoding};
pub use cookies::{
    Cookie, CookieError, ParseResult, load_cookies_into_jar, parse_netscape_cookies,
    parse_set_cookie,
};
pub use error::{AuthError, LoginStage};
pub use manager::{LoginState, SessionManager};
pub use session::{Clock, Credentials, ManualClock, Session, SystemClock};
pub use storage::{SessionStore, StorageError};
pub use token::{
    CookieTokenExtractor, DEFAULT_CSRF_COOKIE, DEFAULT_CSRF_FIELD, DEFAULT_CSRF_META,
    HiddenInputExtractor, LoginPage, MetaTagExtractor, TokenExtractor, default_extractors,
    extract_token, run_extractors,
};
