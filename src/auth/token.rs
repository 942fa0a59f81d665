//! Anti-forgery token extraction.
//!
//! A login page can carry its anti-forgery token in a cookie, a hidden form
//! field, or a `<meta>` tag. Each location is one [`TokenExtractor`]; the
//! session manager tries them in order and stops at the first match.

use std::fmt;

use super::cookies::Cookie;
use crate::html;

/// Default name of the anti-forgery cookie.
pub const DEFAULT_CSRF_COOKIE: &str = "csrftoken";

/// Default name of the hidden anti-forgery form field.
pub const DEFAULT_CSRF_FIELD: &str = "csrfmiddlewaretoken";

/// Default name of the anti-forgery `<meta>` tag.
pub const DEFAULT_CSRF_META: &str = "csrf-token";

/// What a token extractor gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct LoginPage<'a> {
    /// The response body of the login entry point.
    pub body: &'a str,
    /// Cookies set while fetching it.
    pub cookies: &'a [Cookie],
}

/// One way of finding the anti-forgery token on a login page.
pub trait TokenExtractor: Send + Sync + fmt::Debug {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Returns the token if this strategy finds one.
    fn extract(&self, page: &LoginPage<'_>) -> Option<String>;
}

/// Looks for a named cookie.
#[derive(Debug, Clone)]
pub struct CookieTokenExtractor {
    cookie_name: String,
}

impl CookieTokenExtractor {
    /// Extractor for the cookie called `cookie_name`.
    #[must_use]
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }
}

impl TokenExtractor for CookieTokenExtractor {
    fn name(&self) -> &'static str {
        "cookie"
    }

    fn extract(&self, page: &LoginPage<'_>) -> Option<String> {
        page.cookies
            .iter()
            .rev()
            .find(|cookie| cookie.name == self.cookie_name && !cookie.value().is_empty())
            .map(|cookie| cookie.value().to_string())
    }
}

/// Looks for `<input name="…" value="…">`.
#[derive(Debug, Clone)]
pub struct HiddenInputExtractor {
    field_name: String,
}

impl HiddenInputExtractor {
    /// Extractor for the form field called `field_name`.
    #[must_use]
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
        }
    }
}

impl TokenExtractor for HiddenInputExtractor {
    fn name(&self) -> &'static str {
        "hidden-input"
    }

    fn extract(&self, page: &LoginPage<'_>) -> Option<String> {
        html::find_tags(page.body, "input").into_iter().find_map(|tag| {
            let name = html::attribute(tag, "name")?;
            if name != self.field_name {
                return None;
            }
            html::attribute(tag, "value").filter(|value| !value.is_empty())
        })
    }
}

/// Looks for `<meta name="…" content="…">`.
#[derive(Debug, Clone)]
pub struct MetaTagExtractor {
    meta_name: String,
}

impl MetaTagExtractor {
    /// Extractor for the meta tag called `meta_name`.
    #[must_use]
    pub fn new(meta_name: impl Into<String>) -> Self {
        Self {
            meta_name: meta_name.into(),
        }
    }
}

impl TokenExtractor for MetaTagExtractor {
    fn name(&self) -> &'static str {
        "meta-tag"
    }

    fn extract(&self, page: &LoginPage<'_>) -> Option<String> {
        html::find_tags(page.body, "meta").into_iter().find_map(|tag| {
            let name = html::attribute(tag, "name")?;
            if !name.eq_ignore_ascii_case(&self.meta_name) {
                return None;
            }
            html::attribute(tag, "content").filter(|value| !value.is_empty())
        })
    }
}

/// The standard strategy order: cookie, hidden input, meta tag.
#[must_use]
pub fn default_extractors(
    cookie_name: &str,
    field_name: &str,
    meta_name: &str,
) -> Vec<Box<dyn TokenExtractor>> {
    vec![
        Box::new(CookieTokenExtractor::new(cookie_name)),
        Box::new(HiddenInputExtractor::new(field_name)),
        Box::new(MetaTagExtractor::new(meta_name)),
    ]
}

/// Runs `extractors` in order; returns the first token and the strategy that found it.
#[must_use]
pub fn run_extractors(
    extractors: &[Box<dyn TokenExtractor>],
    page: &LoginPage<'_>,
) -> Option<(String, &'static str)> {
    extractors
        .iter()
        .find_map(|extractor| extractor.extract(page).map(|token| (token, extractor.name())))
}

/// Finds an anti-forgery token in HTML markup alone, using the default
/// field and meta tag names.
#[must_use]
pub fn extract_token(html: &str) -> Option<String> {
    let page = LoginPage {
        body: html,
        cookies: &[],
    };
    HiddenInputExtractor::new(DEFAULT_CSRF_FIELD)
        .extract(&page)
        .or_else(|| MetaTagExtractor::new(DEFAULT_CSRF_META).extract(&page))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "Xk3d9-pQ_zz81";

    fn defaults() -> Vec<Box<dyn TokenExtractor>> {
        default_extractors(DEFAULT_CSRF_COOKIE, DEFAULT_CSRF_FIELD, DEFAULT_CSRF_META)
    }

    fn cookie_fixture() -> Vec<Cookie> {
        vec![
            Cookie::new("learning.example.com", false, "/", true, None, "other", "nope"),
            Cookie::new("learning.example.com", false, "/", true, None, "csrftoken", TOKEN),
        ]
    }

    const HIDDEN_INPUT_FIXTURE: &str = r#"<html><body>
        <form method="post" action="/login/">
          <input type="email" name="email">
          <input type="hidden" value="Xk3d9-pQ_zz81" name="csrfmiddlewaretoken" />
          <button>Sign in</button>
        </form></body></html>"#;

    const META_FIXTURE: &str = r#"<!doctype html><html><head>
        <META NAME="csrf-token" CONTENT="Xk3d9-pQ_zz81">
        <meta name="viewport" content="width=device-width">
        </head><body><div id="app"></div></body></html>"#;

    #[test]
    fn test_cookie_strategy() {
        let cookies = cookie_fixture();
        let page = LoginPage {
            body: "<html></html>",
            cookies: &cookies,
        };
        assert_eq!(
            CookieTokenExtractor::new(DEFAULT_CSRF_COOKIE).extract(&page).as_deref(),
            Some(TOKEN)
        );
    }

    #[test]
    fn test_hidden_input_strategy() {
        let page = LoginPage {
            body: HIDDEN_INPUT_FIXTURE,
            cookies: &[],
        };
        assert_eq!(
            HiddenInputExtractor::new(DEFAULT_CSRF_FIELD).extract(&page).as_deref(),
            Some(TOKEN)
        );
    }

    #[test]
    fn test_meta_tag_strategy() {
        let page = LoginPage {
            body: META_FIXTURE,
            cookies: &[],
        };
        assert_eq!(
            MetaTagExtractor::new(DEFAULT_CSRF_META).extract(&page).as_deref(),
            Some(TOKEN)
        );
    }

    #[test]
    fn test_three_fixtures_yield_same_token_through_the_chain() {
        let cookies = cookie_fixture();
        let pages = [
            LoginPage {
                body: "<html><body>no token here</body></html>",
                cookies: &cookies,
            },
            LoginPage {
                body: HIDDEN_INPUT_FIXTURE,
                cookies: &[],
            },
            LoginPage {
                body: META_FIXTURE,
                cookies: &[],
            },
        ];
        let expected_strategies = ["cookie", "hidden-input", "meta-tag"];

        for (page, expected) in pages.iter().zip(expected_strategies) {
            let (token, strategy) = run_extractors(&defaults(), page).unwrap_or_default();
            assert_eq!(token, TOKEN);
            assert_eq!(strategy, expected);
        }
    }

    #[test]
    fn test_cookie_wins_over_markup() {
        let cookies = vec![Cookie::new("e.com", false, "/", true, None, "csrftoken", "from-cookie")];
        let page = LoginPage {
            body: HIDDEN_INPUT_FIXTURE,
            cookies: &cookies,
        };
        let (token, strategy) = run_extractors(&defaults(), &page).unwrap_or_default();
        assert_eq!(token, "from-cookie");
        assert_eq!(strategy, "cookie");
    }

    #[test]
    fn test_no_strategy_matches() {
        let page = LoginPage {
            body: r#"<input name="csrfmiddlewaretoken" value=""><meta name="csrf-token">"#,
            cookies: &[],
        };
        assert!(run_extractors(&defaults(), &page).is_none());
    }

    #[test]
    fn test_extract_token_from_markup() {
        assert_eq!(extract_token(HIDDEN_INPUT_FIXTURE).as_deref(), Some(TOKEN));
        assert_eq!(extract_token(META_FIXTURE).as_deref(), Some(TOKEN));
        assert_eq!(extract_token("<p>nothing</p>"), None);
    }
}
