//! Catalog queries: resource URLs, tables of contents and title search.
//!
//! Everything here needs an authenticated [`Session`](crate::auth::Session)
//! and goes through the shared [`Transport`](crate::transport::Transport).

mod client;
mod error;
mod links;

pub use client::{Catalog, CatalogConfig, DEFAULT_SEARCH_LIMIT, SearchHit, SearchResults};
pub use error::CatalogError;
pub use links::{Link, extract_content_links};
