//! Content-link extraction from navigation documents.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::html;

#[allow(clippy::expect_used)]
static CONTENT_LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+\.xhtml)["'][^>]*>(.*?)</a>"#)
        .expect("content link regex is valid") // Static pattern, safe to panic
});

/// A chapter or section of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Display title, tags stripped and entities decoded.
    pub title: String,
    /// Target path relative to the book root.
    pub href: String,
}

/// Returns the links to `.xhtml` content documents in `html`, in document
/// order. Links to `index.xhtml` are skipped.
#[must_use]
pub fn extract_content_links(html: &str) -> Vec<Link> {
    CONTENT_LINK_PATTERN
        .captures_iter(html)
        .filter_map(|caps| {
            let href = html::unescape_entities(caps.get(1)?.as_str().trim());
            if href.contains("index.xhtml") {
                return None;
            }
            let text = html::unescape_entities(&html::strip_tags(caps.get(2)?.as_str()));
            let title = text.split_whitespace().collect::<Vec<_>>().join(" ");
            Some(Link { title, href })
        })
        .collect()
}
