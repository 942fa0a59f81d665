//! Cookie model, Netscape cookie file parser, `Set-Cookie` parser, and jar loader.
//!
//! [`Cookie`] is the serializable cookie snapshot kept inside a
//! [`Session`](super::Session). Cookies reach it from three places: a
//! Netscape cookie file, a JSON browser export (see
//! [`parse_captured_cookies`](super::parse_captured_cookies)), and the
//! `Set-Cookie` headers observed during login.

use std::fmt;
use std::io::BufRead;
use std::time::SystemTime;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::cookie::Jar;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

/// A single cookie with its scope and expiry.
///
/// The value is redacted in `Debug` output to prevent accidental logging of
/// session credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// The domain the cookie belongs to (leading `.` when subdomains match).
    pub domain: String,
    /// Whether subdomains should match.
    pub include_subdomains: bool,
    /// The URL path scope for the cookie.
    pub path: String,
    /// Whether the cookie should only be sent over HTTPS.
    pub secure: bool,
    /// Expiry instant; `None` for a session cookie.
    pub expires: Option<DateTime<Utc>>,
    /// Cookie name.
    pub name: String,
    value: String,
}

impl Cookie {
    /// Creates a new cookie entry.
    #[must_use]
    pub fn new(
        domain: impl Into<String>,
        include_subdomains: bool,
        path: impl Into<String>,
        secure: bool,
        expires: Option<DateTime<Utc>>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            include_subdomains,
            path: path.into(),
            secure,
            expires,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive; avoid logging the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true if the cookie has an expiry at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    /// Returns true if the cookie would be sent to `host`.
    #[must_use]
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        if host == domain {
            return true;
        }
        self.include_subdomains && host.ends_with(&format!(".{domain}"))
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("domain", &self.domain)
            .field("include_subdomains", &self.include_subdomains)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Errors that can occur while parsing a cookie file.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// A line in the cookie file has an invalid format.
    #[error("line {line_number}: {reason} (got: {content})")]
    InvalidLine {
        /// 1-based line number in the cookie file.
        line_number: usize,
        /// The offending line content, value redacted.
        content: String,
        /// Description of what was wrong.
        reason: String,
    },

    /// I/O error reading the cookie file.
    #[error("failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// No valid cookies found in a non-empty file.
    #[error("no valid cookies found in file ({malformed_count} lines failed to parse)")]
    NoCookiesFound {
        /// Number of malformed lines encountered.
        malformed_count: usize,
    },
}

/// Cookies parsed from a file plus warnings for the lines that were skipped.
#[derive(Debug)]
pub struct ParseResult {
    /// Successfully parsed cookies.
    pub cookies: Vec<Cookie>,
    /// Malformed lines (line number and reason).
    pub warnings: Vec<(usize, String)>,
}

/// Parses a Netscape-format cookie file from a buffered reader.
///
/// Each non-comment, non-blank line must contain exactly 7 TAB-separated fields:
/// `domain`, `include_subdomains`, `path`, `secure`, `expires`, `name`, `value`.
/// An `expires` of `0` marks a session cookie.
///
/// Lines starting with `#` and blank lines are skipped, except the
/// `#HttpOnly_` prefix some exporters put in front of HTTP-only cookies.
///
/// # Errors
///
/// Returns [`CookieError::Io`] on read failure, or
/// [`CookieError::NoCookiesFound`] when a non-empty file yields zero valid cookies.
/// Individual malformed lines are collected as warnings.
#[instrument(level = "debug", skip(reader))]
pub fn parse_netscape_cookies(reader: impl BufRead) -> Result<ParseResult, CookieError> {
    let mut cookies = Vec::new();
    let mut warnings = Vec::new();
    let mut data_lines = 0;

    for (idx, line_result) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line_result?;
        let line = line.trim_end();

        if line.is_empty() {
            continue;
        }
        let line = match line.strip_prefix("#HttpOnly_") {
            Some(rest) => rest,
            None if line.starts_with('#') => continue,
            None => line,
        };

        data_lines += 1;

        match parse_cookie_line(line, line_number) {
            Ok(cookie) => {
                debug!(
                    line = line_number,
                    domain = %cookie.domain,
                    name = %cookie.name,
                    "parsed cookie"
                );
                cookies.push(cookie);
            }
            Err(e) => {
                warn!(line = line_number, reason = %e, "skipping malformed cookie line");
                warnings.push((line_number, e.to_string()));
            }
        }
    }

    if cookies.is_empty() && data_lines > 0 {
        return Err(CookieError::NoCookiesFound {
            malformed_count: warnings.len(),
        });
    }

    Ok(ParseResult { cookies, warnings })
}

fn parse_cookie_line(line: &str, line_number: usize) -> Result<Cookie, CookieError> {
    let invalid = |reason: String| CookieError::InvalidLine {
        line_number,
        content: redact_line_for_error(line),
        reason,
    };

    let fields: Vec<&str> = line.split('\t').collect();
    let [domain, subdomains, path, secure, expires, name, value] = fields.as_slice() else {
        return Err(invalid(format!(
            "expected 7 TAB-separated fields, found {}",
            fields.len()
        )));
    };

    let include_subdomains = parse_bool_field(subdomains)
        .ok_or_else(|| invalid(format!("subdomain field must be TRUE or FALSE, got '{subdomains}'")))?;
    let secure = parse_bool_field(secure)
        .ok_or_else(|| invalid(format!("secure field must be TRUE or FALSE, got '{secure}'")))?;
    let expires_secs = expires.parse::<i64>().ok().filter(|secs| *secs >= 0).ok_or_else(|| {
        invalid(format!(
            "expires field must be a non-negative integer, got '{expires}'"
        ))
    })?;

    if domain.is_empty() {
        return Err(invalid("domain field is empty".to_string()));
    }
    if name.is_empty() {
        return Err(invalid("cookie name field is empty".to_string()));
    }

    let expires = if expires_secs == 0 {
        None
    } else {
        // Out-of-range timestamps are far-future; treat them as non-expiring.
        DateTime::from_timestamp(expires_secs, 0)
    };

    Ok(Cookie::new(
        *domain,
        include_subdomains,
        *path,
        secure,
        expires,
        *name,
        *value,
    ))
}

fn parse_bool_field(value: &str) -> Option<bool> {
    match value {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

/// Redacts the cookie value (7th field) from a line for safe error messages.
fn redact_line_for_error(line: &str) -> String {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() >= 7 {
        let mut redacted = fields[..6].join("\t");
        redacted.push_str("\t[REDACTED]");
        redacted
    } else {
        line.to_string()
    }
}

/// Parses one `Set-Cookie` header received from `origin`.
///
/// `Max-Age` takes precedence over `Expires`; a non-positive `Max-Age` yields
/// a cookie that is already expired at `now`. Returns `None` for headers
/// without a `name=value` pair.
#[must_use]
pub fn parse_set_cookie(header: &str, origin: &Url, now: DateTime<Utc>) -> Option<Cookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim().trim_matches('"');

    let mut domain_attr: Option<String> = None;
    let mut path_attr: Option<String> = None;
    let mut secure = false;
    let mut expires: Option<DateTime<Utc>> = None;
    let mut max_age: Option<i64> = None;

    for attribute in parts {
        let (key, attr_value) = attribute
            .split_once('=')
            .map_or((attribute.trim(), ""), |(k, v)| (k.trim(), v.trim()));
        match key.to_ascii_lowercase().as_str() {
            "domain" if !attr_value.is_empty() => {
                domain_attr = Some(attr_value.trim_start_matches('.').to_ascii_lowercase());
            }
            "path" if attr_value.starts_with('/') => path_attr = Some(attr_value.to_string()),
            "secure" => secure = true,
            "expires" => expires = parse_cookie_date(attr_value),
            "max-age" => max_age = attr_value.parse::<i64>().ok(),
            _ => {}
        }
    }

    if let Some(seconds) = max_age {
        expires = if seconds <= 0 {
            Some(now)
        } else {
            TimeDelta::try_seconds(seconds).and_then(|delta| now.checked_add_signed(delta))
        };
    }

    let (domain, include_subdomains) = match domain_attr {
        Some(domain) => (format!(".{domain}"), true),
        None => (origin.host_str()?.to_ascii_lowercase(), false),
    };

    Some(Cookie::new(
        domain,
        include_subdomains,
        path_attr.unwrap_or_else(|| default_cookie_path(origin)),
        secure,
        expires,
        name,
        value,
    ))
}

/// Cookie dates are RFC 7231 dates, sometimes with dashes in the date part.
fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    httpdate::parse_http_date(value)
        .or_else(|_| httpdate::parse_http_date(&value.replace('-', " ")))
        .ok()
        .map(DateTime::<Utc>::from)
}

fn default_cookie_path(origin: &Url) -> String {
    let path = origin.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Loads cookies into an existing `reqwest` cookie jar.
///
/// Each cookie is converted to a `Set-Cookie` string and registered against
/// an origin URL built from its domain and path, so the jar applies its own
/// domain matching afterwards.
#[instrument(level = "debug", skip(jar, cookies), fields(count = cookies.len()))]
pub fn load_cookies_into_jar(jar: &Jar, cookies: &[Cookie]) {
    for cookie in cookies {
        let set_cookie = build_set_cookie_string(cookie);
        let origin_url = build_origin_url(cookie);

        if let Ok(url) = origin_url.parse::<Url>() {
            jar.add_cookie_str(&set_cookie, &url);
            debug!(domain = %cookie.domain, name = %cookie.name, "loaded cookie into jar");
        } else {
            warn!(
                domain = %cookie.domain,
                name = %cookie.name,
                "skipping cookie with unparseable domain"
            );
        }
    }
}

fn build_set_cookie_string(cookie: &Cookie) -> String {
    let mut parts = vec![format!("{}={}", cookie.name, cookie.value())];

    if cookie.include_subdomains {
        parts.push(format!("Domain={}", cookie.domain.trim_start_matches('.')));
    }
    parts.push(format!("Path={}", cookie.path));
    if cookie.secure {
        parts.push("Secure".to_string());
    }
    if let Some(expires) = cookie.expires {
        parts.push(format!(
            "Expires={}",
            httpdate::fmt_http_date(SystemTime::from(expires))
        ));
    }

    parts.join("; ")
}

/// Origin URL for `Jar::add_cookie_str`: scheme from the secure flag, no leading dot.
fn build_origin_url(cookie: &Cookie) -> String {
    let scheme = if cookie.secure { "https" } else { "http" };
    let domain = cookie.domain.trim_start_matches('.');
    format!("{scheme}://{domain}{}", cookie.path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;
    use std::io::Cursor;

    fn cursor(s: &str) -> Cursor<&[u8]> {
        Cursor::new(s.as_bytes())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    // ==================== Netscape parsing ====================

    #[test]
    fn test_parse_netscape_cookies_valid_file() {
        let input = "\
# Netscape HTTP Cookie File
.oreilly.com\tTRUE\t/\tTRUE\t1700000000\torm-jwt\teyJhbGciOi
learning.oreilly.com\tFALSE\t/api\tFALSE\t0\tcsrftoken\tabc123
";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies.len(), 2);
        assert!(result.warnings.is_empty());

        let jwt = &result.cookies[0];
        assert_eq!(jwt.domain, ".oreilly.com");
        assert!(jwt.include_subdomains);
        assert!(jwt.secure);
        assert_eq!(jwt.expires, Some(at(1_700_000_000)));
        assert_eq!(jwt.name, "orm-jwt");
        assert_eq!(jwt.value(), "eyJhbGciOi");

        let csrf = &result.cookies[1];
        assert_eq!(csrf.path, "/api");
        assert_eq!(csrf.expires, None, "0 marks a session cookie");
    }

    #[test]
    fn test_parse_netscape_cookies_keeps_httponly_prefixed_lines() {
        let input = "#HttpOnly_.example.com\tTRUE\t/\tTRUE\t0\tsid\tv\n# plain comment\n";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies.len(), 1);
        assert_eq!(result.cookies[0].domain, ".example.com");
    }

    #[test]
    fn test_parse_netscape_cookies_malformed_lines_with_line_numbers() {
        let input = "\
# Header
.good.com\tTRUE\t/\tFALSE\t0\tname\tvalue
bad line without tabs
.also-good.com\tTRUE\t/\tFALSE\t0\tother\tval
";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies.len(), 2);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].0, 3);
        assert!(result.warnings[0].1.contains("expected 7 TAB-separated fields"));
    }

    #[test]
    fn test_parse_netscape_cookies_empty_and_comment_only() {
        assert!(parse_netscape_cookies(cursor("")).unwrap().cookies.is_empty());
        assert!(
            parse_netscape_cookies(cursor("# Netscape HTTP Cookie File\n"))
                .unwrap()
                .cookies
                .is_empty()
        );
    }

    #[test]
    fn test_parse_netscape_cookies_all_malformed_returns_error() {
        let input = "bad line one\n.x.com\tYES\t/\tFALSE\t0\tn\tv\n.x.com\tTRUE\t/\tFALSE\t-4\tn\tv\n";
        let err = parse_netscape_cookies(cursor(input)).unwrap_err();
        assert!(
            matches!(err, CookieError::NoCookiesFound { malformed_count: 3 }),
            "got: {err}"
        );
    }

    #[test]
    fn test_parse_netscape_cookies_rejects_empty_domain_and_name() {
        assert!(parse_netscape_cookies(cursor("\tTRUE\t/\tFALSE\t0\tname\tvalue\n")).is_err());
        assert!(parse_netscape_cookies(cursor(".e.com\tTRUE\t/\tFALSE\t0\t\tvalue\n")).is_err());
    }

    #[test]
    fn test_parse_netscape_cookies_crlf_line_endings() {
        let input = "# Header\r\n.example.com\tTRUE\t/\tFALSE\t0\tname\tvalue\r\n";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies[0].value(), "value");
    }

    // ==================== Redaction ====================

    #[test]
    fn test_cookie_debug_redacts_value() {
        let cookie = Cookie::new(".e.com", true, "/", false, None, "orm-jwt", "super_secret_token");
        let debug_str = format!("{cookie:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("super_secret_token"));
    }

    #[test]
    fn test_redact_line_for_error_hides_value() {
        let redacted = redact_line_for_error(".example.com\tTRUE\t/\tFALSE\t0\tname\tsecret_value");
        assert!(!redacted.contains("secret_value"));
        assert!(redacted.contains("[REDACTED]"));
    }

    // ==================== Set-Cookie ====================

    #[test]
    fn test_parse_set_cookie_with_max_age() {
        let origin = Url::parse("https://learning.oreilly.com/login/").unwrap();
        let now = at(1_000_000);
        let cookie = parse_set_cookie(
            "orm-jwt=abc.def; Domain=.oreilly.com; Path=/; Max-Age=3600; Secure; HttpOnly",
            &origin,
            now,
        )
        .unwrap();

        assert_eq!(cookie.name, "orm-jwt");
        assert_eq!(cookie.value(), "abc.def");
        assert_eq!(cookie.domain, ".oreilly.com");
        assert!(cookie.include_subdomains);
        assert!(cookie.secure);
        assert_eq!(cookie.expires, Some(at(1_003_600)));
    }

    #[test]
    fn test_parse_set_cookie_with_expires_and_host_only() {
        let origin = Url::parse("https://www.example.com/member/auth/login").unwrap();
        let cookie = parse_set_cookie(
            "sid=xyz; expires=Wed, 21 Oct 2015 07:28:00 GMT",
            &origin,
            at(0),
        )
        .unwrap();

        assert_eq!(cookie.domain, "www.example.com");
        assert!(!cookie.include_subdomains);
        assert_eq!(cookie.path, "/member/auth");
        assert_eq!(cookie.expires, Some(at(1_445_412_480)));
    }

    #[test]
    fn test_parse_set_cookie_dashed_expires() {
        let origin = Url::parse("https://example.com/").unwrap();
        let cookie =
            parse_set_cookie("a=b; Expires=Wed, 21-Oct-2015 07:28:00 GMT", &origin, at(0)).unwrap();
        assert_eq!(cookie.expires, Some(at(1_445_412_480)));
    }

    #[test]
    fn test_parse_set_cookie_max_age_overrides_expires_and_zero_expires_now() {
        let origin = Url::parse("https://example.com/").unwrap();
        let now = at(5_000);
        let cookie = parse_set_cookie(
            "a=b; Expires=Wed, 21 Oct 2099 07:28:00 GMT; Max-Age=0",
            &origin,
            now,
        )
        .unwrap();
        assert!(cookie.is_expired_at(now));
    }

    #[test]
    fn test_parse_set_cookie_rejects_missing_pair() {
        let origin = Url::parse("https://example.com/").unwrap();
        assert!(parse_set_cookie("garbage", &origin, at(0)).is_none());
        assert!(parse_set_cookie("=value", &origin, at(0)).is_none());
    }

    #[test]
    fn test_matches_host() {
        let wide = Cookie::new(".oreilly.com", true, "/", true, None, "n", "v");
        assert!(wide.matches_host("learning.oreilly.com"));
        assert!(wide.matches_host("oreilly.com"));
        assert!(!wide.matches_host("evil-oreilly.com"));

        let narrow = Cookie::new("www.oreilly.com", false, "/", true, None, "n", "v");
        assert!(narrow.matches_host("WWW.oreilly.com"));
        assert!(!narrow.matches_host("learning.oreilly.com"));
    }

    // ==================== Jar loading ====================

    #[test]
    fn test_load_cookies_into_jar_serves_matching_urls() {
        let jar = Jar::default();
        let cookies = vec![
            Cookie::new(".example.com", true, "/", true, None, "session", "abc"),
            Cookie::new("other.com", false, "/", false, None, "x", "y"),
        ];
        load_cookies_into_jar(&jar, &cookies);

        let url = Url::parse("https://sub.example.com/page").unwrap();
        let header = jar.cookies(&url).unwrap();
        assert_eq!(header.to_str().unwrap(), "session=abc");

        let other = Url::parse("http://other.com/").unwrap();
        assert_eq!(jar.cookies(&other).unwrap().to_str().unwrap(), "x=y");
    }

    #[test]
    fn test_build_set_cookie_string_includes_expiry() {
        let cookie = Cookie::new(".e.com", true, "/", true, Some(at(1_445_412_480)), "n", "v");
        let header = build_set_cookie_string(&cookie);
        assert!(header.starts_with("n=v; Domain=e.com; Path=/; Secure"));
        assert!(header.contains("Expires=Wed, 21 Oct 2015 07:28:00 GMT"));
    }
}
