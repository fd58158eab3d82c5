//! Translation stage. Providers form a fallback chain tried per text; a
//! failure only degrades the article it belongs to, never the cycle.
//!
//! The title is the contract: an article counts as translated once its
//! title landed. A summary that resists translation rides along in the
//! original language rather than blocking delivery.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::article::{Article, DeliveryState};
use crate::config::Settings;
use crate::error::TranslationError;

/// Texts shorter than this pass through untranslated; they are usually
/// acronyms or proper nouns that translators mangle.
const MIN_TRANSLATABLE_CHARS: usize = 10;

/// Articles translated concurrently within one batch.
const BATCH_CONCURRENCY: usize = 4;

/// Memo cap; the map is dropped wholesale when it fills. Retried articles
/// in back-to-back cycles hit the memo instead of the providers.
const MEMO_MAX_ENTRIES: usize = 512;

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslationError>;

    fn name(&self) -> &'static str;
}

/// Keyless Google endpoint used by the web widget client. No quota token,
/// so it is the default first hop.
pub struct GoogleWebProvider {
    client: reqwest::Client,
}

impl GoogleWebProvider {
    const ENDPOINT: &'static str = "https://translate.googleapis.com/translate_a/single";

    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranslationProvider for GoogleWebProvider {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslationError> {
        let provider = self.name();
        let response = self
            .client
            .get(Self::ENDPOINT)
            .query(&[
                ("client", "gtx"),
                ("dt", "t"),
                ("sl", source_lang),
                ("tl", target_lang),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| TranslationError::Provider {
                provider,
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| TranslationError::Provider {
                provider,
                reason: e.to_string(),
            })?;

        // Body is a nested array; segment texts sit at [0][i][0].
        let body: Value = response
            .json()
            .await
            .map_err(|e| TranslationError::Provider {
                provider,
                reason: format!("body: {e}"),
            })?;
        let segments = body
            .get(0)
            .and_then(Value::as_array)
            .ok_or(TranslationError::Provider {
                provider,
                reason: "unexpected response shape".into(),
            })?;

        let mut out = String::new();
        for segment in segments {
            if let Some(piece) = segment.get(0).and_then(Value::as_str) {
                out.push_str(piece);
            }
        }
        if out.trim().is_empty() {
            return Err(TranslationError::Provider {
                provider,
                reason: "empty translation".into(),
            });
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

/// Azure Cognitive Services translator; only wired when a key is present.
pub struct MicrosoftProvider {
    client: reqwest::Client,
    api_key: String,
}

impl MicrosoftProvider {
    const ENDPOINT: &'static str = "https://api.cognitive.microsofttranslator.com/translate";

    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[derive(Deserialize)]
struct MsTranslation {
    text: String,
}
#[derive(Deserialize)]
struct MsResult {
    translations: Vec<MsTranslation>,
}

#[async_trait]
impl TranslationProvider for MicrosoftProvider {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslationError> {
        let provider = self.name();
        let mut query: Vec<(&str, &str)> = vec![("api-version", "3.0"), ("to", target_lang)];
        if source_lang != "auto" {
            query.push(("from", source_lang));
        }

        let results: Vec<MsResult> = self
            .client
            .post(Self::ENDPOINT)
            .query(&query)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .json(&[serde_json::json!({ "Text": text })])
            .send()
            .await
            .map_err(|e| TranslationError::Provider {
                provider,
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| TranslationError::Provider {
                provider,
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| TranslationError::Provider {
                provider,
                reason: format!("body: {e}"),
            })?;

        results
            .into_iter()
            .next()
            .and_then(|r| r.translations.into_iter().next())
            .map(|t| t.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(TranslationError::Provider {
                provider,
                reason: "empty translation".into(),
            })
    }

    fn name(&self) -> &'static str {
        "microsoft"
    }
}

/// Canned provider for tests and dry runs: prefixes instead of translating.
pub struct FixedProvider {
    pub prefix: &'static str,
}

#[async_trait]
impl TranslationProvider for FixedProvider {
    async fn translate(
        &self,
        text: &str,
        _source_lang: &str,
        _target_lang: &str,
    ) -> Result<String, TranslationError> {
        Ok(format!("{}{}", self.prefix, text))
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub struct Translator {
    providers: Vec<Box<dyn TranslationProvider>>,
    source_lang: String,
    target_lang: String,
    memo: Mutex<HashMap<String, String>>,
}

impl Translator {
    pub fn new(
        providers: Vec<Box<dyn TranslationProvider>>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            providers,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &Settings, client: &reqwest::Client) -> Self {
        let mut providers: Vec<Box<dyn TranslationProvider>> =
            vec![Box::new(GoogleWebProvider::new(client.clone()))];
        if let Some(key) = &settings.microsoft_translator_key {
            providers.push(Box::new(MicrosoftProvider::new(client.clone(), key.clone())));
        }
        Self::new(
            providers,
            settings.translation_source_language.clone(),
            settings.translation_target_language.clone(),
        )
    }

    /// Translate title and summary in place. The title decides the result:
    /// if it lands, the article is `Translated` even when the summary kept
    /// its original language.
    pub async fn translate_article(&self, article: &mut Article) -> Result<(), TranslationError> {
        let title = self.translate_text(&article.title).await?;
        article.translated_title = Some(title);

        if let Some(summary) = article.summary.clone() {
            match self.translate_text(&summary).await {
                Ok(translated) => article.translated_summary = Some(translated),
                Err(e) => {
                    debug!(url = %article.url, error = %e, "summary kept untranslated");
                }
            }
        }
        article.state = DeliveryState::Translated;
        Ok(())
    }

    /// Run the provider chain for one text. Short texts skip the chain and
    /// count as translated.
    pub async fn translate_text(&self, text: &str) -> Result<String, TranslationError> {
        let trimmed = text.trim();
        if trimmed.chars().count() < MIN_TRANSLATABLE_CHARS {
            return Ok(text.to_string());
        }
        if let Some(hit) = self
            .memo
            .lock()
            .expect("translation memo poisoned")
            .get(trimmed)
        {
            return Ok(hit.clone());
        }

        for provider in &self.providers {
            match provider
                .translate(trimmed, &self.source_lang, &self.target_lang)
                .await
            {
                Ok(translated) => {
                    let mut memo = self.memo.lock().expect("translation memo poisoned");
                    if memo.len() >= MEMO_MAX_ENTRIES {
                        memo.clear();
                    }
                    memo.insert(trimmed.to_string(), translated.clone());
                    return Ok(translated);
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "translation attempt failed");
                    counter!("relay_translation_provider_errors_total").increment(1);
                }
            }
        }
        Err(TranslationError::Exhausted)
    }
}

/// Translate a batch with bounded concurrency. Never fails the batch:
/// articles whose translation was exhausted come back untouched and are
/// counted, leaving the delivery policy to decide their fate.
pub async fn translate_batch(
    translator: &Translator,
    articles: Vec<Article>,
) -> (Vec<Article>, usize) {
    let results: Vec<(Article, bool)> = stream::iter(articles.into_iter().map(|mut article| {
        async move {
            match translator.translate_article(&mut article).await {
                Ok(()) => (article, true),
                Err(e) => {
                    warn!(url = %article.url, error = %e, "article translation failed");
                    (article, false)
                }
            }
        }
    }))
    .buffer_unordered(BATCH_CONCURRENCY)
    .collect()
    .await;

    let mut out = Vec::with_capacity(results.len());
    let mut failures = 0usize;
    for (article, ok) in results {
        if !ok {
            failures += 1;
        }
        out.push(article);
    }
    if failures > 0 {
        counter!("relay_translation_failures_total").increment(failures as u64);
    }
    (out, failures)
}
