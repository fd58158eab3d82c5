//! RSS tier: last resort in the priority list. Polls a small set of
//! security-news feeds and flattens them into one batch.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::warn;

use crate::article::{clean_text, truncate_summary, Article};
use crate::error::SourceError;
use crate::sources::{fetch_text, SourceAdapter};

const ENV_PATH: &str = "RSS_FEEDS_PATH";

/// Per-feed cap; keeps one chatty feed from crowding out the rest.
const MAX_ITEMS_PER_FEED: usize = 10;

/// Minimum title length for an item to count as an article and not a
/// category stub or ad slot.
const MIN_TITLE_CHARS: usize = 10;

/// One feed the adapter polls. `name` becomes the article's source label.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
}

/// Built-in feed set; deployments can swap it via `config/rss_feeds.toml`.
pub fn default_feeds() -> Vec<FeedSpec> {
    [
        ("KrebsOnSecurity", "https://krebsonsecurity.com/feed/"),
        ("DarkReading", "https://www.darkreading.com/rss.xml"),
        (
            "SecurityAffairs",
            "https://securityaffairs.com/feed",
        ),
        (
            "CSOOnline",
            "https://www.csoonline.com/feed/",
        ),
    ]
    .into_iter()
    .map(|(name, url)| FeedSpec {
        name: name.to_string(),
        url: url.to_string(),
    })
    .collect()
}

/// Load the feed list using env var + fallbacks:
/// 1) $RSS_FEEDS_PATH
/// 2) config/rss_feeds.toml
/// 3) config/rss_feeds.json
/// 4) built-in [`default_feeds`]
pub fn load_feeds_default() -> Result<Vec<FeedSpec>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_feeds_from(&pb);
        }
        return Err(anyhow!("RSS_FEEDS_PATH points to non-existent path"));
    }
    let toml_p = PathBuf::from("config/rss_feeds.toml");
    if toml_p.exists() {
        return load_feeds_from(&toml_p);
    }
    let json_p = PathBuf::from("config/rss_feeds.json");
    if json_p.exists() {
        return load_feeds_from(&json_p);
    }
    Ok(default_feeds())
}

pub fn load_feeds_from(path: &Path) -> Result<Vec<FeedSpec>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading feed list from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_feed_list(&content, &ext)
}

fn parse_feed_list(s: &str, hint_ext: &str) -> Result<Vec<FeedSpec>> {
    #[derive(Deserialize)]
    struct TomlFeeds {
        feeds: Vec<FeedSpec>,
    }
    if hint_ext == "toml" || s.contains("[[feeds]]") {
        if let Ok(v) = toml::from_str::<TomlFeeds>(s) {
            return Ok(clean_feed_list(v.feeds));
        }
    }
    if let Ok(v) = serde_json::from_str::<Vec<FeedSpec>>(s) {
        return Ok(clean_feed_list(v));
    }
    Err(anyhow!("unsupported feed list format"))
}

fn clean_feed_list(feeds: Vec<FeedSpec>) -> Vec<FeedSpec> {
    let mut out: Vec<FeedSpec> = Vec::new();
    for f in feeds {
        let name = f.name.trim();
        let url = f.url.trim();
        if name.is_empty() || url.is_empty() {
            continue;
        }
        if out.iter().any(|e| e.url == url) {
            continue;
        }
        out.push(FeedSpec {
            name: name.to_string(),
            url: url.to_string(),
        });
    }
    out
}

// Wire shape of an RSS 2.0 document, only the fields we read.
#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

pub struct RssFeedAdapter {
    client: reqwest::Client,
    feeds: Vec<FeedSpec>,
}

impl RssFeedAdapter {
    pub const NAME: &'static str = "RssFeeds";

    pub fn new(client: reqwest::Client, feeds: Vec<FeedSpec>) -> Self {
        Self { client, feeds }
    }
}

/// Parse one feed body into articles, newest-first order preserved from
/// the document. Items without a usable title or link are skipped.
pub fn parse_feed(xml: &str, feed_name: &str, now: DateTime<Utc>) -> Result<Vec<Article>, SourceError> {
    let cleaned = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&cleaned)
        .map_err(|e| SourceError::unavailable(RssFeedAdapter::NAME, format!("{feed_name}: {e}")))?;

    let mut out = Vec::new();
    for item in rss.channel.items.into_iter().take(MAX_ITEMS_PER_FEED) {
        let title = clean_text(item.title.as_deref().unwrap_or_default());
        let Some(link) = item.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) else {
            continue;
        };
        if title.chars().count() < MIN_TITLE_CHARS {
            continue;
        }
        let summary = item
            .description
            .as_deref()
            .map(clean_text)
            .filter(|d| !d.is_empty())
            .map(|d| truncate_summary(&d));
        let published_at = item
            .pub_date
            .as_deref()
            .and_then(parse_pub_date)
            .unwrap_or(now);
        out.push(Article::new(feed_name, title, summary, link, published_at));
    }
    Ok(out)
}

/// Feeds disagree on date formats; RFC 2822 dominates, a few emit RFC 3339.
fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// Undeclared HTML entities inside descriptions break strict XML parsing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[async_trait]
impl SourceAdapter for RssFeedAdapter {
    async fn fetch_latest(&self, limit: usize) -> Result<Vec<Article>, SourceError> {
        let now = Utc::now();
        let mut out: Vec<Article> = Vec::new();
        let mut failures = 0usize;

        for feed in &self.feeds {
            let fetched = match fetch_text(&self.client, &feed.url, Self::NAME).await {
                Ok(body) => parse_feed(&body, &feed.name, now),
                Err(e) => Err(e),
            };
            match fetched {
                Ok(items) => out.extend(items),
                Err(e) => {
                    warn!(feed = %feed.name, error = %e, "rss feed failed");
                    failures += 1;
                }
            }
            if out.len() >= limit {
                break;
            }
        }

        if out.is_empty() && !self.feeds.is_empty() && failures == self.feeds.len() {
            return Err(SourceError::unavailable(
                Self::NAME,
                format!("all {} feeds failed", self.feeds.len()),
            ));
        }

        out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        out.truncate(limit);
        Ok(out)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}
