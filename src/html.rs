//! Minimal HTML scanning helpers.
//!
//! Login pages and navigation documents are scraped with regular expressions
//! behind narrow functions, so the brittle parts stay in one place and the
//! callers only see tags, attributes and text.

use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static ATTRIBUTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .expect("attribute regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex is valid"));

#[allow(clippy::expect_used)]
static NUMERIC_ENTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").expect("entity regex is valid")
});

/// Returns every opening tag named `name` (case-insensitive) as raw text.
pub(crate) fn find_tags<'a>(html: &'a str, name: &str) -> Vec<&'a str> {
    let Ok(pattern) = Regex::new(&format!(r"(?is)<{}\b[^>]*>", regex::escape(name))) else {
        return Vec::new();
    };
    pattern.find_iter(html).map(|m| m.as_str()).collect()
}

/// Returns the value of attribute `name` (case-insensitive) in a raw tag.
pub(crate) fn attribute(tag: &str, name: &str) -> Option<String> {
    ATTRIBUTE_PATTERN.captures_iter(tag).find_map(|caps| {
        let key = caps.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?;
        Some(unescape_entities(value.as_str()))
    })
}

/// Removes markup, leaving text content.
pub(crate) fn strip_tags(html: &str) -> String {
    TAG_PATTERN.replace_all(html, "").into_owned()
}

/// Decodes the common named entities and numeric character references.
pub(crate) fn unescape_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let numeric = NUMERIC_ENTITY_PATTERN.replace_all(text, |caps: &regex::Captures<'_>| {
        let code = caps
            .get(1)
            .and_then(|hex| u32::from_str_radix(hex.as_str(), 16).ok())
            .or_else(|| caps.get(2).and_then(|dec| dec.as_str().parse().ok()));
        code.and_then(char::from_u32)
            .map_or_else(|| caps[0].to_string(), String::from)
    });
    numeric
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}
