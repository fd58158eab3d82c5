//! The unit the pipeline moves: one news article, normalized into a common
//! shape regardless of which source produced it.
//!
//! Identity is derived once at construction and never changes afterwards.
//! The canonical URL is the preferred key; when a source hands us something
//! unparseable we fall back to a digest of source, title and publish date so
//! the article can still be deduplicated across cycles.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Hard cap on summary length, in characters, applied before translation.
pub const SUMMARY_MAX_CHARS: usize = 300;

/// Where an article sits in the pipeline. Only `Delivered` is durable
/// (via the seen store); the rest live for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Translated,
    Delivered,
    Failed,
}

/// Routing category. Vulnerability news can go to a dedicated group;
/// everything else lands in the general one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    General,
    Vulnerabilities,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Vulnerabilities => "vulnerabilities",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Stable dedup fingerprint, see [`identity_key`].
    pub identity_key: String,
    pub source_name: String,
    pub title: String,
    pub summary: Option<String>,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub translated_title: Option<String>,
    pub translated_summary: Option<String>,
    pub state: DeliveryState,
    pub category: Category,
}

impl Article {
    pub fn new(
        source_name: impl Into<String>,
        title: impl Into<String>,
        summary: Option<String>,
        url: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let source_name = source_name.into();
        let title = title.into();
        let url = url.into();
        let identity_key = identity_key(&url, &source_name, &title, published_at);
        Self {
            identity_key,
            source_name,
            title,
            summary,
            url,
            published_at,
            translated_title: None,
            translated_summary: None,
            state: DeliveryState::Pending,
            category: Category::General,
        }
    }

    /// Title as it should reach the reader: translated when we have it.
    pub fn display_title(&self) -> &str {
        self.translated_title.as_deref().unwrap_or(&self.title)
    }

    pub fn display_summary(&self) -> Option<&str> {
        self.translated_summary
            .as_deref()
            .or(self.summary.as_deref())
    }
}

/// Stable fingerprint for dedup. The canonical URL when the link parses,
/// otherwise a sha256 over `source|title|publish-date` so identity never
/// silently collapses to a shared constant.
pub fn identity_key(
    url: &str,
    source_name: &str,
    title: &str,
    published_at: DateTime<Utc>,
) -> String {
    if let Some(canonical) = canonical_url(url) {
        return canonical;
    }
    let mut hasher = Sha256::new();
    hasher.update(source_name.as_bytes());
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(published_at.format("%Y-%m-%d").to_string().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Reduce a link to its canonical identity form: fragment dropped, tracking
/// parameters stripped, trailing slashes trimmed. Returns `None` for
/// anything that is not an absolute http(s) URL.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str()?;
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
    }

    let mut out = url.to_string();
    while out.ends_with('/') {
        out.pop();
    }
    Some(out)
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || key == "fbclid" || key == "gclid"
}

/// Strip markup leftovers from scraped text: entities decoded, tags dropped,
/// whitespace collapsed.
pub fn clean_text(s: &str) -> String {
    static RE_TAG: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tag = RE_TAG.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").expect("tag regex"));
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));

    let decoded = html_escape::decode_html_entities(s);
    let untagged = re_tag.replace_all(&decoded, " ");
    re_ws.replace_all(&untagged, " ").trim().to_string()
}

/// Cap a summary at [`SUMMARY_MAX_CHARS`], cutting on a char boundary and
/// marking the cut with an ellipsis.
pub fn truncate_summary(s: &str) -> String {
    if s.chars().count() <= SUMMARY_MAX_CHARS {
        return s.to_string();
    }
    let cut: String = s.chars().take(SUMMARY_MAX_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}
