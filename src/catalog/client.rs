//! Catalog API client: resource URLs, table of contents and title search.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::error::CatalogError;
use super::links::{Link, extract_content_links};
use crate::auth::Session;
use crate::download::ResourceDescriptor;
use crate::transport::{HttpRequest, Transport, read_text};

/// Default catalog base URL.
const DEFAULT_BASE_URL: &str = "https://learning.oreilly.com";

/// Result count used when a search asks for zero.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Endpoint layout of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Scheme and host every endpoint hangs off, without trailing slash.
    pub base_url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl CatalogConfig {
    /// Config rooted at `base_url`.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Primary (EPUB) resource URL.
    #[must_use]
    pub fn epub_url(&self, id: &str) -> String {
        format!("{}/api/v2/epubs/{}.epub", self.base_url, urlencoding::encode(id))
    }

    /// Fallback (PDF) resource URL.
    #[must_use]
    pub fn pdf_url(&self, id: &str) -> String {
        format!("{}/api/v2/pdfs/{}.pdf", self.base_url, urlencoding::encode(id))
    }

    /// JSON table-of-contents endpoint.
    #[must_use]
    pub fn toc_url(&self, id: &str) -> String {
        format!("{}/api/v2/library/{}/toc/", self.base_url, urlencoding::encode(id))
    }

    /// Navigation document used when the TOC endpoint is unavailable.
    #[must_use]
    pub fn navigation_url(&self, id: &str, book_id: &str) -> String {
        format!(
            "{}/library/view/{}/{}/navigation.xhtml",
            self.base_url,
            urlencoding::encode(id),
            urlencoding::encode(book_id)
        )
    }

    /// Title search endpoint.
    #[must_use]
    pub fn search_url(&self, query: &str, limit: usize) -> String {
        format!(
            "{}/api/v2/search/?query={}&field=title&limit={limit}",
            self.base_url,
            urlencoding::encode(query)
        )
    }
}

// ==================== API Response Types ====================

#[derive(Debug, Deserialize)]
struct TocResponse {
    #[serde(default)]
    chapters: Vec<TocChapter>,
}

#[derive(Debug, Deserialize)]
struct TocChapter {
    #[serde(default)]
    title: String,
    #[serde(default)]
    path: String,
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Book title.
    #[serde(default)]
    pub title: String,
    /// Identifier usable with [`Catalog::resource_descriptor`].
    #[serde(default, alias = "archive_id")]
    pub slug: String,
    /// Author names.
    #[serde(default, alias = "author", deserialize_with = "one_or_many")]
    pub authors: Vec<String>,
}

/// A page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Total number of matches the service reports.
    #[serde(default)]
    pub count: u64,
    /// This page of hits.
    #[serde(default)]
    pub results: Vec<SearchHit>,
    /// URL of the next page, if any.
    #[serde(default)]
    pub next: Option<String>,
}

/// Accepts `"author": "A"` as well as `"authors": ["A", "B"]`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(name)) if !name.is_empty() => vec![name],
        Some(OneOrMany::Many(names)) => names,
        _ => Vec::new(),
    })
}

// ==================== Catalog ====================

/// Authenticated catalog queries.
#[derive(Debug, Clone)]
pub struct Catalog {
    transport: Arc<Transport>,
    config: CatalogConfig,
}

impl Catalog {
    /// Creates a catalog client over `transport`.
    #[must_use]
    pub fn new(transport: Arc<Transport>, config: CatalogConfig) -> Self {
        Self { transport, config }
    }

    /// The endpoint layout.
    #[must_use]
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// EPUB-then-PDF descriptor for `id`, saved under `out_dir`.
    #[must_use]
    pub fn resource_descriptor(&self, id: &str, out_dir: &Path) -> ResourceDescriptor {
        ResourceDescriptor::epub_with_pdf_fallback(
            self.config.epub_url(id),
            self.config.pdf_url(id),
            out_dir.join(format!("{}.epub", file_stem_for(id))),
        )
    }

    /// Fetches the chapter list of a book.
    ///
    /// Tries the JSON TOC endpoint first; any non-success status there falls
    /// back to scraping the navigation document.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::HttpStatus`] if the navigation document is
    /// also unavailable, and [`CatalogError::Json`] if the TOC endpoint
    /// answers with an unexpected body.
    #[instrument(skip(self, cancel, session))]
    pub async fn fetch_toc(
        &self,
        cancel: &CancellationToken,
        session: &Session,
        id: &str,
        book_id: &str,
    ) -> Result<Vec<Link>, CatalogError> {
        if id.trim().is_empty() || book_id.trim().is_empty() {
            return Err(CatalogError::InvalidArgument {
                reason: "book identifier and book id must not be empty",
            });
        }
        check_session(session)?;

        let toc_url = self.config.toc_url(id);
        let response = self
            .transport
            .execute(cancel, &json_request(&toc_url, session))
            .await?;
        let status = response.status();
        if status.is_success() {
            let body = read_text(cancel, response).await?;
            let toc: TocResponse =
                serde_json::from_str(&body).map_err(|e| CatalogError::json(&toc_url, e))?;
            let links: Vec<Link> = toc
                .chapters
                .into_iter()
                .map(|chapter| Link {
                    title: chapter.title,
                    href: chapter.path,
                })
                .collect();
            debug!(chapters = links.len(), "table of contents from API");
            return Ok(links);
        }
        debug!(status = status.as_u16(), "TOC endpoint unavailable, using navigation document");

        let nav_url = self.config.navigation_url(id, book_id);
        let request = HttpRequest::get(nav_url.as_str()).bearer(session.token());
        let response = self.transport.execute(cancel, &request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::HttpStatus {
                url: nav_url,
                status: status.as_u16(),
            });
        }
        let body = read_text(cancel, response).await?;
        let links = extract_content_links(&body);
        debug!(chapters = links.len(), "table of contents from navigation document");
        Ok(links)
    }

    /// Searches titles. A `limit` of zero means [`DEFAULT_SEARCH_LIMIT`].
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::HttpStatus`] on a non-success status and
    /// [`CatalogError::Json`] on an unexpected body.
    #[instrument(skip(self, cancel, session))]
    pub async fn search(
        &self,
        cancel: &CancellationToken,
        session: &Session,
        query: &str,
        limit: usize,
    ) -> Result<SearchResults, CatalogError> {
        if query.trim().is_empty() {
            return Err(CatalogError::InvalidArgument {
                reason: "search query must not be empty",
            });
        }
        check_session(session)?;

        let limit = if limit == 0 { DEFAULT_SEARCH_LIMIT } else { limit };
        let url = self.config.search_url(query.trim(), limit);
        let response = self
            .transport
            .execute(cancel, &json_request(&url, session))
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }
        let body = read_text(cancel, response).await?;
        let results: SearchResults =
            serde_json::from_str(&body).map_err(|e| CatalogError::json(&url, e))?;
        debug!(hits = results.results.len(), total = results.count, "search complete");
        Ok(results)
    }
}

fn json_request(url: &str, session: &Session) -> HttpRequest {
    HttpRequest::get(url)
        .bearer(session.token())
        .header("accept", "application/json")
}

fn check_session(session: &Session) -> Result<(), CatalogError> {
    if session.is_valid() {
        Ok(())
    } else {
        Err(CatalogError::InvalidSession)
    }
}

/// Identifier reduced to characters safe in a file name.
fn file_stem_for(id: &str) -> String {
    let stem: String = id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches('.');
    if stem.is_empty() {
        "book".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::ResourceKind;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use crate::transport::{RateLimitConfig, TransportConfig};
    use chrono::{TimeDelta, Utc};
    use std::path::PathBuf;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn catalog(base: &str) -> Catalog {
        let transport = Transport::new(TransportConfig {
            rate_limit: RateLimitConfig::Disabled,
            ..TransportConfig::default()
        })
        .unwrap();
        Catalog::new(Arc::new(transport), CatalogConfig::with_base_url(base))
    }

    fn session() -> Session {
        let now = Utc::now();
        Session::new("jwt", "Bearer", now, now + TimeDelta::hours(1))
    }

    #[test]
    fn test_url_templates() {
        let config = CatalogConfig::with_base_url("https://example.com/");
        assert_eq!(config.epub_url("978-1"), "https://example.com/api/v2/epubs/978-1.epub");
        assert_eq!(config.pdf_url("978-1"), "https://example.com/api/v2/pdfs/978-1.pdf");
        assert_eq!(config.toc_url("978-1"), "https://example.com/api/v2/library/978-1/toc/");
        assert_eq!(
            config.navigation_url("slug", "978"),
            "https://example.com/library/view/slug/978/navigation.xhtml"
        );
        assert_eq!(
            config.search_url("rust async", 5),
            "https://example.com/api/v2/search/?query=rust%20async&field=title&limit=5"
        );
    }

    #[test]
    fn test_resource_descriptor_layout() {
        let descriptor = catalog("https://e.com").resource_descriptor("97810/98", Path::new("out"));
        let candidates = descriptor.candidates();
        assert_eq!(candidates[0].kind, ResourceKind::Epub);
        assert_eq!(candidates[0].destination, PathBuf::from("out/97810_98.epub"));
        assert_eq!(candidates[1].destination, PathBuf::from("out/97810_98.pdf"));
        assert_eq!(file_stem_for(".."), "book");
    }

    #[test]
    fn test_search_hit_author_shapes() {
        let results: SearchResults = serde_json::from_str(
            r#"{"count": 2, "results": [
                {"title": "A", "slug": "a", "author": "Ann"},
                {"title": "B", "archive_id": "b", "authors": ["Bo", "Cy"]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(results.results[0].authors, vec!["Ann"]);
        assert_eq!(results.results[1].slug, "b");
        assert_eq!(results.results[1].authors, vec!["Bo", "Cy"]);
        assert_eq!(results.next, None);
    }

    #[tokio::test]
    async fn test_toc_from_api() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/api/v2/library/slug/toc/"))
            .and(header("authorization", "Bearer jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "chapters": [{"title": "One", "path": "ch01.xhtml"}]
            })))
            .mount(&server)
            .await;

        let links = catalog(&server.uri())
            .fetch_toc(&CancellationToken::new(), &session(), "slug", "978")
            .await
            .unwrap();
        assert_eq!(
            links,
            vec![Link {
                title: "One".to_string(),
                href: "ch01.xhtml".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_toc_falls_back_to_navigation() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/api/v2/library/slug/toc/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/library/view/slug/978/navigation.xhtml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="index.xhtml">Index</a><a href="ch01.xhtml">Intro</a>"#,
            ))
            .mount(&server)
            .await;

        let links = catalog(&server.uri())
            .fetch_toc(&CancellationToken::new(), &session(), "slug", "978")
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Intro");
    }

    #[tokio::test]
    async fn test_search_defaults_limit() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/api/v2/search/"))
            .and(query_param("query", "tokio"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "results": [{"title": "Tokio", "slug": "tokio-book", "authors": []}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = catalog(&server.uri())
            .search(&CancellationToken::new(), &session(), "tokio", 0)
            .await
            .unwrap();
        assert_eq!(results.results[0].slug, "tokio-book");
    }

    #[tokio::test]
    async fn test_empty_arguments_are_rejected() {
        let catalog = catalog("https://e.com");
        let cancel = CancellationToken::new();
        assert!(matches!(
            catalog.search(&cancel, &session(), "  ", 1).await,
            Err(CatalogError::InvalidArgument { .. })
        ));
        assert!(matches!(
            catalog.fetch_toc(&cancel, &session(), "slug", "").await,
            Err(CatalogError::InvalidArgument { .. })
        ));
    }
}
