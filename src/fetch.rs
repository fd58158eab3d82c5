//! Fetch orchestration. Sources are tried strictly in priority order; a
//! failure or a thin result falls through to the next source. The date
//! floor is applied here so stale items never reach dedup, and each
//! source's whole fetch runs under one time budget.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tracing::{info, warn};

use crate::article::Article;
use crate::config::Settings;
use crate::sources::hacker_news::HackerNewsAdapter;
use crate::sources::news_sites::NewsSiteAdapter;
use crate::sources::rss::{self, RssFeedAdapter};
use crate::sources::SourceAdapter;

pub struct FetchOutcome {
    pub candidates: Vec<Article>,
    pub sources_tried: usize,
    pub sources_failed: usize,
}

impl FetchOutcome {
    /// Every source in the list failed this cycle.
    pub fn degraded(&self) -> bool {
        self.sources_tried > 0 && self.sources_failed == self.sources_tried
    }
}

pub struct FetchOrchestrator {
    sources: Vec<Box<dyn SourceAdapter>>,
    request_timeout: Duration,
    max_articles: usize,
    min_per_source: usize,
    min_article_date: DateTime<Utc>,
}

impl FetchOrchestrator {
    pub fn new(
        sources: Vec<Box<dyn SourceAdapter>>,
        request_timeout: Duration,
        max_articles: usize,
        min_per_source: usize,
        min_article_date: DateTime<Utc>,
    ) -> Self {
        Self {
            sources,
            request_timeout,
            max_articles,
            min_per_source: min_per_source.max(1),
            min_article_date,
        }
    }

    pub fn from_settings(settings: &Settings, sources: Vec<Box<dyn SourceAdapter>>) -> Self {
        Self::new(
            sources,
            settings.request_timeout,
            settings.max_articles_per_fetch,
            settings.min_articles_per_source,
            settings.min_article_date,
        )
    }

    /// Collect one cycle's candidate batch. Returns normally even when
    /// every source fails; the outcome records how degraded the cycle was.
    pub async fn collect(&self) -> FetchOutcome {
        let mut candidates: Vec<Article> = Vec::new();
        let mut sources_tried = 0usize;
        let mut sources_failed = 0usize;

        for adapter in &self.sources {
            if candidates.len() >= self.max_articles {
                break;
            }
            sources_tried += 1;
            let remaining = self.max_articles - candidates.len();

            let t0 = Instant::now();
            let fetched =
                match tokio::time::timeout(self.request_timeout, adapter.fetch_latest(remaining))
                    .await
                {
                    Ok(Ok(items)) => items,
                    Ok(Err(e)) => {
                        warn!(source = adapter.name(), error = %e, "source failed");
                        counter!("relay_source_errors_total").increment(1);
                        sources_failed += 1;
                        continue;
                    }
                    Err(_) => {
                        warn!(
                            source = adapter.name(),
                            timeout_s = self.request_timeout.as_secs(),
                            "source timed out"
                        );
                        counter!("relay_source_errors_total").increment(1);
                        sources_failed += 1;
                        continue;
                    }
                };
            histogram!("relay_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            let total = fetched.len();
            let (mut kept, stale): (Vec<Article>, Vec<Article>) = fetched
                .into_iter()
                .partition(|a| a.published_at >= self.min_article_date);
            kept.truncate(remaining);
            if !stale.is_empty() {
                counter!("relay_articles_stale_total").increment(stale.len() as u64);
            }

            info!(
                source = adapter.name(),
                fetched = total,
                kept = kept.len(),
                "source fetched"
            );
            counter!("relay_articles_fetched_total").increment(kept.len() as u64);
            candidates.append(&mut kept);

            // A source that produced enough satisfies the cycle; the rest
            // of the list stays untouched.
            if candidates.len() >= self.min_per_source {
                break;
            }
        }

        FetchOutcome {
            candidates,
            sources_tried,
            sources_failed,
        }
    }
}

/// The production priority list, highest first.
pub fn default_sources(settings: &Settings, client: &reqwest::Client) -> Vec<Box<dyn SourceAdapter>> {
    let feeds = match rss::load_feeds_default() {
        Ok(feeds) => feeds,
        Err(e) => {
            warn!(error = %e, "feed list unusable, using built-ins");
            rss::default_feeds()
        }
    };
    vec![
        Box::new(HackerNewsAdapter::new(client.clone())),
        Box::new(NewsSiteAdapter::new(client.clone())),
        Box::new(RssFeedAdapter::new(client.clone(), feeds)),
    ]
}
