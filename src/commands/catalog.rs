//! `toc` and `search` commands.

use anyhow::{Result, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::context::AppContext;

pub async fn run_toc_command(
    ctx: &AppContext,
    cancel: &CancellationToken,
    id: &str,
    book_id: &str,
) -> Result<()> {
    let session = ctx.require_session()?;
    let links = ctx
        .catalog()
        .fetch_toc(cancel, &session, id, book_id)
        .await
        .map_err(|error| anyhow!("Cannot fetch table of contents: {error}"))?;

    if links.is_empty() {
        info!("No chapters found");
    }
    for (index, link) in links.iter().enumerate() {
        println!("{:>3}. {}  ({})", index + 1, link.title, link.href);
    }
    Ok(())
}

pub async fn run_search_command(
    ctx: &AppContext,
    cancel: &CancellationToken,
    query: &str,
    limit: usize,
) -> Result<()> {
    let session = ctx.require_session()?;
    let results = ctx
        .catalog()
        .search(cancel, &session, query, limit)
        .await
        .map_err(|error| anyhow!("Search failed: {error}"))?;

    info!(total = results.count, shown = results.results.len(), "Search results");
    for hit in &results.results {
        if hit.authors.is_empty() {
            println!("{}  {}", hit.slug, hit.title);
        } else {
            println!("{}  {} ({})", hit.slug, hit.title, hit.authors.join(", "));
        }
    }
    Ok(())
}
