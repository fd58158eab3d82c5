//! Telegram Bot API client and message rendering. This is the relay's only
//! outbound channel; the token never appears in logs or errors.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::article::Article;
use crate::deliver::{Destination, MessageSender};
use crate::error::DeliveryError;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct TelegramSender {
    client: reqwest::Client,
    token: String,
    timeout: Duration,
    max_retries: u8,
}

impl TelegramSender {
    pub fn new(client: reqwest::Client, token: String) -> Self {
        Self {
            client,
            token,
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    fn endpoint(&self) -> String {
        format!("{API_BASE}/bot{}/sendMessage", self.token)
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl MessageSender for TelegramSender {
    /// One message to one destination. Transport errors and 429/5xx answers
    /// are retried with backoff; anything else from the API (bad chat id,
    /// bot kicked, broken markup) will not heal and fails immediately.
    async fn send(&self, destination: Destination, text: &str) -> Result<(), DeliveryError> {
        let payload = SendMessage {
            chat_id: destination.chat_id,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
            message_thread_id: destination.topic_id,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(self.endpoint())
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    let api: Option<ApiResponse> = rsp.json().await.ok();
                    let api = api.filter(|a| !a.ok);
                    return Err(DeliveryError::Api {
                        code: api
                            .as_ref()
                            .and_then(|a| a.error_code)
                            .unwrap_or_else(|| i64::from(status.as_u16())),
                        description: api
                            .and_then(|a| a.description)
                            .unwrap_or_else(|| status.to_string()),
                    });
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(DeliveryError::Http(e));
                }
            }
        }
    }
}

/// Render one article as a Telegram Markdown message.
pub fn format_article(article: &Article) -> String {
    let title = escape_markdown(article.display_title());
    let summary = article
        .display_summary()
        .map(escape_markdown)
        .unwrap_or_default();
    let date = article.published_at.format("%d.%m.%Y %H:%M");

    let mut text = format!("📰 *{title}*\n\n");
    if !summary.is_empty() {
        text.push_str(&summary);
        text.push_str("\n\n");
    }
    text.push_str(&format!("📍 {}\n", source_label(&article.source_name)));
    text.push_str(&format!("📅 {date}\n"));
    text.push_str(&format!("🔗 [Read more]({})", escape_link(&article.url)));

    if article.translated_title.is_none() {
        text.push_str("\n\n_original language (translation unavailable)_");
    }
    text
}

fn source_label(source_name: &str) -> String {
    match source_name {
        "TheHackerNews" => "🇺🇸 The Hacker News".to_string(),
        "BleepingComputer" => "💻 BleepingComputer".to_string(),
        "SecurityWeek" => "🔒 SecurityWeek".to_string(),
        "InfoSecurity Magazine" => "📊 InfoSecurity Magazine".to_string(),
        "KrebsOnSecurity" => "🔍 Krebs on Security".to_string(),
        "DarkReading" => "🌐 Dark Reading".to_string(),
        "CSOOnline" => "👔 CSO Online".to_string(),
        "SecurityAffairs" => "🛡️ Security Affairs".to_string(),
        other => format!("📰 {other}"),
    }
}

// Legacy-Markdown control characters in scraped text would otherwise break
// the whole message at the API.
fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_link(url: &str) -> String {
    url.replace('(', "%28").replace(')', "%29")
}
