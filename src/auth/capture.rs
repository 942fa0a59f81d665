//! Parsing and validation of externally captured cookie sets.
//!
//! Supports the formats browser extensions export:
//! - Netscape HTTP Cookie File format
//! - JSON cookie exports (array or `{ "cookies": [...] }`)
//!
//! Validation runs against a caller-supplied instant so expiry filtering is
//! deterministic under a controlled clock.

use std::collections::HashSet;
use std::io::BufReader;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::cookies::{Cookie, CookieError, parse_netscape_cookies};

/// Cookie payload format detected during capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturedCookieFormat {
    /// Netscape HTTP Cookie File format.
    Netscape,
    /// JSON export format.
    Json,
}

/// Parsed and validated cookies captured from user input.
#[derive(Debug)]
pub struct CapturedCookies {
    /// Valid cookies after format parsing and validation.
    pub cookies: Vec<Cookie>,
    /// Non-fatal warnings encountered while parsing or validating.
    pub warnings: Vec<String>,
    /// Input format that was parsed.
    pub format: CapturedCookieFormat,
}

/// Errors that can occur while parsing captured cookie input.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Input was empty.
    #[error("cookie input is empty")]
    EmptyInput,
    /// Netscape-format parser failed.
    #[error(transparent)]
    Netscape(#[from] CookieError),
    /// JSON parser failed.
    #[error("invalid cookie JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// No valid cookies remained after validation.
    #[error("no valid cookies found after validation")]
    NoValidCookies,
}

/// Parses and validates cookie input in either Netscape or JSON format.
///
/// Cookies that are expired at `now`, or have an empty domain, name or value,
/// are dropped with a warning.
///
/// # Errors
///
/// Returns [`CaptureError`] when input is empty, parsing fails, or every
/// cookie was rejected.
#[instrument(level = "debug", skip(input))]
pub fn parse_captured_cookies(
    input: &str,
    now: DateTime<Utc>,
) -> Result<CapturedCookies, CaptureError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CaptureError::EmptyInput);
    }

    let (cookies, mut warnings, format) = if looks_like_json(trimmed) {
        let (cookies, warnings) = parse_json_cookies(trimmed)?;
        (cookies, warnings, CapturedCookieFormat::Json)
    } else {
        let result = parse_netscape_cookies(BufReader::new(trimmed.as_bytes()))?;
        let warnings = result
            .warnings
            .iter()
            .map(|(line, reason)| format!("line {line}: {reason}"))
            .collect::<Vec<_>>();
        (result.cookies, warnings, CapturedCookieFormat::Netscape)
    };

    let (valid_cookies, validation_warnings) = validate_cookies(cookies, now);
    warnings.extend(validation_warnings);

    if valid_cookies.is_empty() {
        return Err(CaptureError::NoValidCookies);
    }

    debug!(
        kept = valid_cookies.len(),
        warnings = warnings.len(),
        ?format,
        "captured cookies validated"
    );

    Ok(CapturedCookies {
        cookies: valid_cookies,
        warnings,
        format,
    })
}

/// Counts unique cookie domains in the provided cookie list.
#[must_use]
pub fn unique_domain_count(cookies: &[Cookie]) -> usize {
    cookies
        .iter()
        .map(|cookie| cookie.domain.trim_start_matches('.').to_ascii_lowercase())
        .collect::<HashSet<_>>()
        .len()
}

fn looks_like_json(input: &str) -> bool {
    input.starts_with('[') || input.starts_with('{')
}

fn validate_cookies(cookies: Vec<Cookie>, now: DateTime<Utc>) -> (Vec<Cookie>, Vec<String>) {
    let mut valid = Vec::new();
    let mut warnings = Vec::new();

    for mut cookie in cookies {
        if cookie.domain.trim().is_empty() {
            warnings.push("skipped cookie with empty domain".to_string());
            continue;
        }
        if cookie.name.trim().is_empty() {
            warnings.push("skipped cookie with empty name".to_string());
            continue;
        }
        if cookie.value().is_empty() {
            warnings.push(format!(
                "skipped cookie '{}' for domain '{}' because value is empty",
                cookie.name, cookie.domain
            ));
            continue;
        }
        if cookie.path.trim().is_empty() {
            cookie.path = "/".to_string();
        }
        if cookie.is_expired_at(now) {
            warnings.push(format!(
                "skipped expired cookie '{}' for domain '{}'",
                cookie.name, cookie.domain
            ));
            continue;
        }

        valid.push(cookie);
    }

    (valid, warnings)
}

fn parse_json_cookies(input: &str) -> Result<(Vec<Cookie>, Vec<String>), CaptureError> {
    let payload: JsonCookiePayload = serde_json::from_str(input)?;
    let entries = match payload {
        JsonCookiePayload::Array(entries) => entries,
        JsonCookiePayload::Wrapped { cookies } => cookies,
    };

    let mut cookies = Vec::new();
    let mut warnings = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        match convert_json_cookie(entry) {
            Ok(cookie) => cookies.push(cookie),
            Err(reason) => warnings.push(format!("entry {}: {}", index + 1, reason)),
        }
    }

    Ok((cookies, warnings))
}

fn convert_json_cookie(entry: JsonCookieEntry) -> Result<Cookie, String> {
    let mut domain = entry
        .domain
        .or(entry.host)
        .unwrap_or_default()
        .trim()
        .to_string();

    if domain.is_empty() {
        return Err("missing required field: domain".to_string());
    }

    for scheme in ["http://", "https://"] {
        if let Some(stripped) = domain.strip_prefix(scheme) {
            domain = stripped.to_string();
        }
    }
    if let Some((host, _rest)) = domain.split_once('/') {
        domain = host.to_string();
    }

    let include_subdomains = entry
        .host_only
        .map_or_else(|| domain.starts_with('.'), |host_only| !host_only);
    if include_subdomains && !domain.starts_with('.') {
        domain = format!(".{domain}");
    }
    if !include_subdomains {
        domain = domain.trim_start_matches('.').to_string();
    }

    let path = match entry.path {
        Some(path) if path.starts_with('/') => path,
        Some(path) if !path.trim().is_empty() => format!("/{path}"),
        _ => "/".to_string(),
    };

    let name = entry.name.unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Err("missing required field: name".to_string());
    }

    let value = entry.value.unwrap_or_default();
    if value.is_empty() {
        return Err(format!(
            "cookie '{name}' for domain '{domain}' has empty value"
        ));
    }

    let expires = if entry.session == Some(true) {
        None
    } else {
        entry
            .expiration_date
            .or(entry.expires)
            .and_then(normalized_expiry)
    };

    Ok(Cookie::new(
        domain,
        include_subdomains,
        path,
        entry.secure.unwrap_or(false),
        expires,
        name,
        value,
    ))
}

/// JSON exports use fractional Unix seconds; non-positive means session cookie.
fn normalized_expiry(raw_expiry: f64) -> Option<DateTime<Utc>> {
    if !raw_expiry.is_finite() || raw_expiry <= 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let secs = raw_expiry.floor().min(i64::MAX as f64) as i64;
    // Beyond chrono's range: far-future, keep as non-expiring.
    DateTime::from_timestamp(secs, 0)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonCookiePayload {
    Array(Vec<JsonCookieEntry>),
    Wrapped { cookies: Vec<JsonCookieEntry> },
}

#[derive(Debug, Deserialize)]
struct JsonCookieEntry {
    domain: Option<String>,
    host: Option<String>,
    #[serde(rename = "hostOnly")]
    host_only: Option<bool>,
    path: Option<String>,
    secure: Option<bool>,
    session: Option<bool>,
    name: Option<String>,
    value: Option<String>,
    #[serde(rename = "expirationDate")]
    expiration_date: Option<f64>,
    expires: Option<f64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    const NOW: i64 = 1_800_000_000;

    #[test]
    fn test_parse_captured_cookies_netscape_format_success() {
        let input = ".oreilly.com\tTRUE\t/\tTRUE\t4102444800\torm-jwt\tabc123";
        let parsed = parse_captured_cookies(input, at(NOW)).unwrap();
        assert_eq!(parsed.format, CapturedCookieFormat::Netscape);
        assert_eq!(parsed.cookies.len(), 1);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_parse_captured_cookies_json_array_success() {
        let input = r#"
[
  {
    "domain": ".oreilly.com",
    "name": "orm-jwt",
    "value": "abc123",
    "path": "/",
    "secure": true,
    "expirationDate": 4102444800.5
  }
]
"#;
        let parsed = parse_captured_cookies(input, at(NOW)).unwrap();
        assert_eq!(parsed.format, CapturedCookieFormat::Json);
        assert_eq!(parsed.cookies[0].domain, ".oreilly.com");
        assert_eq!(parsed.cookies[0].expires, Some(at(4_102_444_800)));
        assert_eq!(unique_domain_count(&parsed.cookies), 1);
    }

    #[test]
    fn test_parse_captured_cookies_json_wrapped_host_only() {
        let input = r#"{"cookies": [{"domain": "https://learning.oreilly.com/home", "hostOnly": true,
            "name": "sid", "value": "xyz", "path": "api", "session": true}]}"#;
        let parsed = parse_captured_cookies(input, at(NOW)).unwrap();
        let cookie = &parsed.cookies[0];
        assert!(!cookie.include_subdomains);
        assert_eq!(cookie.domain, "learning.oreilly.com");
        assert_eq!(cookie.path, "/api");
        assert_eq!(cookie.expires, None);
    }

    #[test]
    fn test_expiry_is_judged_against_supplied_instant() {
        let input = ".oreilly.com\tTRUE\t/\tFALSE\t2000\torm-jwt\tv";
        assert!(parse_captured_cookies(input, at(1_999)).is_ok());
        assert!(matches!(
            parse_captured_cookies(input, at(2_000)),
            Err(CaptureError::NoValidCookies)
        ));
    }

    #[test]
    fn test_json_invalid_entries_warn_and_keep_valid() {
        let input = r#"[
  {"domain": ".ok.com", "name": "ok", "value": "value"},
  {"domain": ".bad.com", "name": "", "value": "missing-name"},
  {"name": "nodomain", "value": "v"}
]"#;
        let parsed = parse_captured_cookies(input, at(NOW)).unwrap();
        assert_eq!(parsed.cookies.len(), 1);
        assert_eq!(parsed.warnings.len(), 2);
    }

    #[test]
    fn test_empty_and_invalid_json_input() {
        assert!(matches!(
            parse_captured_cookies("   ", at(NOW)),
            Err(CaptureError::EmptyInput)
        ));
        assert!(matches!(
            parse_captured_cookies("{not json", at(NOW)),
            Err(CaptureError::Json(_))
        ));
    }

    #[test]
    fn test_validate_cookies_filters_expired_and_empty_values() {
        let cookies = vec![
            Cookie::new(".e.com", true, "/", false, Some(at(1000)), "expired", "val"),
            Cookie::new(".e.com", true, "", false, Some(at(2000)), "valid", "val"),
            Cookie::new(".e.com", true, "/", false, None, "empty", ""),
        ];

        let (valid, warnings) = validate_cookies(cookies, at(1500));
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].name, "valid");
        assert_eq!(valid[0].path, "/", "blank path defaults to root");
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_normalized_expiry_handles_garbage() {
        assert_eq!(normalized_expiry(f64::NAN), None);
        assert_eq!(normalized_expiry(-1.0), None);
        assert_eq!(normalized_expiry(1e300), None);
    }
}
