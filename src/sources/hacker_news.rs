//! Primary source: The Hacker News. The front page links out to article
//! pages; we fetch each page for a real summary and publish date instead of
//! trusting the teaser blocks.
//!
//! `scraper::Html` is not `Send`, so all document handling happens in sync
//! helpers that drop the DOM before the next await.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use crate::article::{clean_text, truncate_summary, Article};
use crate::error::SourceError;
use crate::sources::{fetch_text, SourceAdapter};

/// Hard cap on article pages fetched per cycle, whatever the caller asks.
const MAX_PAGES: usize = 15;

/// Pause between article-page fetches. Short enough that a full batch fits
/// the per-source budget, long enough not to hammer the site.
const PAGE_DELAY: Duration = Duration::from_millis(300);

const MIN_TITLE_CHARS: usize = 10;
const MIN_PARAGRAPH_CHARS: usize = 30;

pub struct HackerNewsAdapter {
    client: reqwest::Client,
    base_url: Url,
}

impl HackerNewsAdapter {
    pub const NAME: &'static str = "TheHackerNews";
    pub const BASE_URL: &'static str = "https://thehackernews.com/";

    pub fn new(client: reqwest::Client) -> Self {
        let base_url = Url::parse(Self::BASE_URL).expect("base url");
        Self { client, base_url }
    }
}

#[async_trait]
impl SourceAdapter for HackerNewsAdapter {
    async fn fetch_latest(&self, limit: usize) -> Result<Vec<Article>, SourceError> {
        let front = fetch_text(&self.client, self.base_url.as_str(), Self::NAME).await?;
        let links = index_links(&front, &self.base_url, limit.min(MAX_PAGES));
        if links.is_empty() {
            warn!(source = Self::NAME, "front page yielded no article links");
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(links.len());
        for (i, link) in links.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(PAGE_DELAY).await;
            }
            let page = match fetch_text(&self.client, link, Self::NAME).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(url = %link, error = %e, "article page fetch failed");
                    continue;
                }
            };
            match parse_article_page(&page, link) {
                Some(article) => out.push(article),
                None => warn!(url = %link, "article page did not parse"),
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

/// Article links from the front page, absolute, deduped, document order
/// kept. Prefers the post containers; falls back to any link that looks
/// like an article path when the layout shifts.
pub fn index_links(html: &str, base: &Url, limit: usize) -> Vec<String> {
    let doc = Html::parse_document(html);
    let containers = Selector::parse("div.body-post").expect("container selector");
    let anchors = Selector::parse("a[href]").expect("anchor selector");

    let mut out: Vec<String> = Vec::new();
    for container in doc.select(&containers) {
        if out.len() >= limit {
            break;
        }
        let href = container
            .select(&anchors)
            .filter_map(|a| a.value().attr("href"))
            .find(|h| is_article_path(h))
            .or_else(|| {
                container
                    .select(&anchors)
                    .filter_map(|a| a.value().attr("href"))
                    .next()
            });
        if let Some(href) = href {
            push_resolved(&mut out, base, href);
        }
    }

    if out.is_empty() {
        for href in doc.select(&anchors).filter_map(|a| a.value().attr("href")) {
            if out.len() >= limit {
                break;
            }
            if is_article_path(href) {
                push_resolved(&mut out, base, href);
            }
        }
    }
    out
}

fn push_resolved(out: &mut Vec<String>, base: &Url, href: &str) {
    if let Ok(abs) = base.join(href) {
        let abs = abs.to_string();
        if !out.contains(&abs) {
            out.push(abs);
        }
    }
}

fn is_article_path(href: &str) -> bool {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"/\d{4}/\d{2}/").expect("article path regex"))
        .is_match(href)
}

/// Parse one article page into an [`Article`]. `None` means the page had no
/// recognizable title; missing dates fall back through meta tags, `<time>`,
/// the URL's `/YYYY/MM/` segment and finally "now".
pub fn parse_article_page(html: &str, url: &str) -> Option<Article> {
    let doc = Html::parse_document(html);

    let title_raw = ["h1.story-title", "h1.entry-title", "h1", "title"]
        .iter()
        .find_map(|css| select_first(&doc, css))
        .map(element_text)?;
    let title = clean_text(&title_raw);
    if title.chars().count() < MIN_TITLE_CHARS {
        return None;
    }

    let summary = extract_summary(&doc);
    let published_at = extract_published_at(&doc, url).unwrap_or_else(Utc::now);

    Some(Article::new(
        HackerNewsAdapter::NAME,
        title,
        summary,
        url,
        published_at,
    ))
}

fn select_first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector).next()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

/// First meaningful paragraph of the article body, capped for delivery.
fn extract_summary(doc: &Html) -> Option<String> {
    const BODY_SELECTORS: [&str; 5] = [
        "div.articlebody",
        "div.story-body",
        "article",
        "div.post-body",
        "div.entry-content",
    ];
    let paragraphs = Selector::parse("p").expect("paragraph selector");

    for css in BODY_SELECTORS {
        let Some(body) = select_first(doc, css) else {
            continue;
        };
        for p in body.select(&paragraphs) {
            let text = clean_text(&element_text(p));
            if text.chars().count() > MIN_PARAGRAPH_CHARS {
                return Some(truncate_summary(&text));
            }
        }
        // Container present but no usable paragraph: take its leading text.
        let flat = clean_text(&element_text(body));
        if !flat.is_empty() {
            return Some(truncate_summary(&flat));
        }
    }
    None
}

fn extract_published_at(doc: &Html, url: &str) -> Option<DateTime<Utc>> {
    const META_SELECTORS: [&str; 3] = [
        r#"meta[property="article:published_time"]"#,
        r#"meta[property="og:published_time"]"#,
        r#"meta[name="publishdate"]"#,
    ];
    for css in META_SELECTORS {
        if let Some(dt) = select_first(doc, css)
            .and_then(|m| m.value().attr("content").map(str::to_string))
            .as_deref()
            .and_then(parse_flexible_date)
        {
            return Some(dt);
        }
    }

    if let Some(time_el) = select_first(doc, "time") {
        let raw = time_el
            .value()
            .attr("datetime")
            .map(str::to_string)
            .unwrap_or_else(|| element_text(time_el));
        if let Some(dt) = parse_flexible_date(&raw) {
            return Some(dt);
        }
    }

    date_from_url(url)
}

/// The site encodes `/YYYY/MM/` in every article path; first of that month
/// is close enough for ordering and the date floor.
pub fn date_from_url(url: &str) -> Option<DateTime<Utc>> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"/(\d{4})/(\d{2})/").expect("url date regex"));
    let caps = re.captures(url)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn parse_flexible_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}
