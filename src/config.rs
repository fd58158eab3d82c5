//! Process configuration, read once at startup from the environment.
//! Local runs pick up `.env` via dotenvy before this module is consulted.
//!
//! Numeric knobs are clamped to sane operational ranges rather than
//! rejected, so a fat-fingered deployment degrades instead of crashing.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

/// Default browser-like UA; several of the sites we poll answer 403 to
/// obvious bot agents.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const DEFAULT_MIN_ARTICLE_DATE: &str = "2025-08-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Console,
}

#[derive(Debug, Clone)]
pub struct Settings {
    // Telegram routing
    pub telegram_bot_token: String,
    pub telegram_group_id: i64,
    pub telegram_topic_id: Option<i64>,
    pub telegram_vulnerabilities_group_id: Option<i64>,
    pub telegram_vulnerabilities_topic_id: Option<i64>,

    // Persistence
    pub database_url: String,
    pub seen_retention_days: u32,

    // Pipeline tuning
    pub parse_interval: Duration,
    pub max_articles_per_fetch: usize,
    pub max_articles_per_category: usize,
    pub min_articles_per_source: usize,
    pub request_timeout: Duration,
    pub min_article_date: DateTime<Utc>,
    pub send_delay: Duration,
    pub send_untranslated_on_failure: bool,

    // Translation
    pub translation_source_language: String,
    pub translation_target_language: String,
    pub microsoft_translator_key: Option<String>,

    // Outbound HTTP
    pub user_agent: String,
    pub force_ipv4: bool,
    pub proxy_url: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,

    // Ops surface
    pub bind_addr: SocketAddr,
    pub parse_api_key: Option<String>,
    pub environment: Environment,
    pub log_format: LogFormat,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let telegram_bot_token =
            env_trimmed("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN is required")?;
        let telegram_group_id: i64 = env_trimmed("TELEGRAM_GROUP_ID")
            .context("TELEGRAM_GROUP_ID is required")?
            .parse()
            .context("TELEGRAM_GROUP_ID must be a chat id (integer)")?;

        let database_url = normalize_database_url(
            &env_trimmed("DATABASE_URL").context("DATABASE_URL is required")?,
        )?;

        let min_article_date = parse_min_date(
            &env_trimmed("MIN_ARTICLE_DATE").unwrap_or_else(|| DEFAULT_MIN_ARTICLE_DATE.into()),
        )?;

        let environment = match env_trimmed("ENVIRONMENT").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("production") => Environment::Production,
            _ => Environment::Development,
        };
        let log_format = match env_trimmed("LOG_FORMAT").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("console") => LogFormat::Console,
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => match environment {
                Environment::Production => LogFormat::Json,
                Environment::Development => LogFormat::Console,
            },
        };

        let port: u16 = env_parsed("METRICS_PORT", 8000);
        let bind_addr: SocketAddr = format!("0.0.0.0:{port}")
            .parse()
            .context("building bind address")?;

        Ok(Self {
            telegram_bot_token,
            telegram_group_id,
            telegram_topic_id: env_parsed_opt("TELEGRAM_TOPIC_ID"),
            telegram_vulnerabilities_group_id: env_parsed_opt("TELEGRAM_VULNERABILITIES_GROUP_ID"),
            telegram_vulnerabilities_topic_id: env_parsed_opt("TELEGRAM_VULNERABILITIES_TOPIC_ID"),
            database_url,
            seen_retention_days: env_clamped("SEEN_RETENTION_DAYS", 90, 30, 3650) as u32,
            parse_interval: Duration::from_secs(
                env_clamped("PARSE_INTERVAL_MINUTES", 120, 5, 1440) * 60,
            ),
            max_articles_per_fetch: env_clamped("MAX_ARTICLES_PER_FETCH", 10, 1, 50) as usize,
            max_articles_per_category: env_clamped("MAX_ARTICLES_PER_CATEGORY", 5, 1, 25) as usize,
            min_articles_per_source: env_clamped("MIN_ARTICLES_PER_SOURCE", 1, 1, 10) as usize,
            request_timeout: Duration::from_secs(env_clamped("REQUEST_TIMEOUT_SECONDS", 30, 5, 120)),
            min_article_date,
            send_delay: Duration::from_secs(env_clamped("SEND_DELAY_SECONDS", 2, 0, 30)),
            send_untranslated_on_failure: env_flag("SEND_UNTRANSLATED_ON_FAILURE", true),
            translation_source_language: env_trimmed("TRANSLATION_SOURCE_LANGUAGE")
                .unwrap_or_else(|| "auto".into()),
            translation_target_language: env_trimmed("TRANSLATION_TARGET_LANGUAGE")
                .unwrap_or_else(|| "ru".into()),
            microsoft_translator_key: env_trimmed("MICROSOFT_TRANSLATOR_KEY"),
            user_agent: env_trimmed("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.into()),
            force_ipv4: env_flag("FORCE_IPV4", false),
            proxy_url: env_trimmed("PROXY_URL"),
            proxy_username: env_trimmed("PROXY_USERNAME"),
            proxy_password: env_trimmed("PROXY_PASSWORD"),
            bind_addr,
            parse_api_key: env_trimmed("PARSE_API_KEY"),
            environment,
            log_format,
        })
    }

    /// Shared outbound client for sources, translation and Telegram.
    /// Timeouts here are per HTTP request; the per-source budget is
    /// enforced separately by the fetch orchestrator.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(Duration::from_secs(10))
            .timeout(self.request_timeout);

        if self.force_ipv4 {
            builder = builder.local_address(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
        }
        if let Some(url) = &self.proxy_url {
            let mut proxy = reqwest::Proxy::all(url).context("invalid PROXY_URL")?;
            if let (Some(user), Some(pass)) = (&self.proxy_username, &self.proxy_password) {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }
        builder.build().context("building http client")
    }
}

/// Hosted Postgres dashboards encourage copy-pasting `KEY=value` lines;
/// tolerate that and plain surrounding whitespace.
fn normalize_database_url(raw: &str) -> Result<String> {
    let mut url = raw.trim();
    if let Some(stripped) = url.strip_prefix("DATABASE_URL=") {
        url = stripped.trim();
    }
    let url = url.trim_matches(|c| c == '"' || c == '\'');
    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        bail!("DATABASE_URL must be a postgres:// or postgresql:// URL");
    }
    Ok(url.to_string())
}

fn parse_min_date(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("MIN_ARTICLE_DATE must be YYYY-MM-DD, got {raw:?}"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("MIN_ARTICLE_DATE out of range")?;
    Ok(midnight.and_utc())
}

fn env_trimmed(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    env_trimmed(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_parsed_opt<T: FromStr>(key: &str) -> Option<T> {
    env_trimmed(key).and_then(|v| v.parse().ok())
}

fn env_clamped(key: &str, default: u64, lo: u64, hi: u64) -> u64 {
    env_parsed(key, default).clamp(lo, hi)
}

fn env_flag(key: &str, default: bool) -> bool {
    env_trimmed(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(default)
}
