//! Secondary tier: well-known security outlets scraped generically from
//! their front pages. The first site that yields anything wins; listing
//! pages rarely carry trustworthy dates, so `published_at` is "now".

use async_trait::async_trait;
use chrono::Utc;
use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

use crate::article::{clean_text, truncate_summary, Article};
use crate::error::SourceError;
use crate::sources::{fetch_text, SourceAdapter};

const MAX_PER_SITE: usize = 10;
const MIN_TITLE_CHARS: usize = 10;

/// One front page and the CSS selector for its article blocks.
#[derive(Debug, Clone, Copy)]
pub struct SiteSpec {
    pub name: &'static str,
    pub url: &'static str,
    pub selector: &'static str,
}

pub const SITES: [SiteSpec; 3] = [
    SiteSpec {
        name: "BleepingComputer",
        url: "https://www.bleepingcomputer.com/",
        selector: "article.bc_latest_news_text",
    },
    SiteSpec {
        name: "SecurityWeek",
        url: "https://www.securityweek.com/",
        selector: "div.post",
    },
    SiteSpec {
        name: "InfoSecurity Magazine",
        url: "https://www.infosecurity-magazine.com/",
        selector: "article",
    },
];

pub struct NewsSiteAdapter {
    client: reqwest::Client,
    sites: Vec<SiteSpec>,
}

impl NewsSiteAdapter {
    pub const NAME: &'static str = "CybersecurityNews";

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            sites: SITES.to_vec(),
        }
    }
}

#[async_trait]
impl SourceAdapter for NewsSiteAdapter {
    async fn fetch_latest(&self, limit: usize) -> Result<Vec<Article>, SourceError> {
        let mut failures = 0usize;

        for site in &self.sites {
            let body = match fetch_text(&self.client, site.url, Self::NAME).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(site = site.name, error = %e, "site fetch failed");
                    failures += 1;
                    continue;
                }
            };
            let mut articles = extract_articles(&body, site);
            if articles.is_empty() {
                warn!(site = site.name, "no article blocks matched");
                continue;
            }
            articles.truncate(limit);
            return Ok(articles);
        }

        if !self.sites.is_empty() && failures == self.sites.len() {
            return Err(SourceError::unavailable(
                Self::NAME,
                format!("all {} sites failed", self.sites.len()),
            ));
        }
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

/// Generic front-page extraction: each matched block needs a link and a
/// plausible headline; the first paragraph, if any, becomes the summary.
pub fn extract_articles(html: &str, site: &SiteSpec) -> Vec<Article> {
    let doc = Html::parse_document(html);
    let Ok(blocks) = Selector::parse(site.selector) else {
        return Vec::new();
    };
    let anchors = Selector::parse("a[href]").expect("anchor selector");
    let headings = Selector::parse("h1, h2, h3").expect("heading selector");
    let paragraphs = Selector::parse("p").expect("paragraph selector");
    let base = Url::parse(site.url).ok();

    let now = Utc::now();
    let mut out = Vec::new();
    for block in doc.select(&blocks).take(MAX_PER_SITE) {
        let Some(link) = block.select(&anchors).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let url = if href.starts_with("http") {
            href.to_string()
        } else if let Some(base) = &base {
            match base.join(href) {
                Ok(abs) => abs.to_string(),
                Err(_) => continue,
            }
        } else {
            continue;
        };

        let title_raw = block
            .select(&headings)
            .next()
            .map(|h| h.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_else(|| link.text().collect::<Vec<_>>().join(" "));
        let title = clean_text(&title_raw);
        if title.chars().count() < MIN_TITLE_CHARS {
            continue;
        }

        let summary = block
            .select(&paragraphs)
            .next()
            .map(|p| clean_text(&p.text().collect::<Vec<_>>().join(" ")))
            .filter(|s| !s.is_empty())
            .map(|s| truncate_summary(&s));

        out.push(Article::new(site.name, title, summary, url, now));
    }
    out
}
