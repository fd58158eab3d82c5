//! Source adapters. Each adapter knows one site's layout and normalizes it
//! into [`Article`]s; fetching order, dedup, translation and delivery are
//! none of its business.

pub mod hacker_news;
pub mod news_sites;
pub mod rss;

use async_trait::async_trait;

use crate::article::Article;
use crate::error::SourceError;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch up to `limit` of the newest articles, newest first where the
    /// source exposes an order. An empty vec is a normal outcome (the
    /// source simply has nothing new); `Err` means the source itself is
    /// unreachable or unparseable this cycle.
    async fn fetch_latest(&self, limit: usize) -> Result<Vec<Article>, SourceError>;

    fn name(&self) -> &'static str;
}

/// GET a page and hand back its body, mapping transport and HTTP-status
/// failures into a single per-source error.
pub(crate) async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    source: &'static str,
) -> Result<String, SourceError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::unavailable(source, format!("{url}: {e}")))?
        .error_for_status()
        .map_err(|e| SourceError::unavailable(source, format!("{url}: {e}")))?;
    response
        .text()
        .await
        .map_err(|e| SourceError::unavailable(source, format!("{url}: body read: {e}")))
}
