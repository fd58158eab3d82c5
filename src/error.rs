//! Failure taxonomy for the relay stages.
//!
//! None of these abort the process. A source failure falls through to the
//! next source in priority order, a translation failure degrades that one
//! article, a delivery failure leaves the article uncommitted so the next
//! cycle retries it, and the scheduler absorbs whatever escapes a cycle.

use thiserror::Error;

/// A source could not produce a batch this cycle. An empty batch is *not*
/// an error; adapters return `Ok(vec![])` when a source has nothing new.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source {name} unavailable: {reason}")]
    Unavailable {
        // Named `name` rather than `source` because thiserror infers a field
        // called `source` as the Error::source cause, which &'static str is not.
        name: &'static str,
        reason: String,
    },
}

impl SourceError {
    pub fn unavailable(source: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            name: source,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TranslationError {
    /// One provider failed; the chain moves on to the next.
    #[error("translation provider {provider} failed: {reason}")]
    Provider {
        provider: &'static str,
        reason: String,
    },

    /// Every configured provider failed for this text.
    #[error("all translation providers failed")]
    Exhausted,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The Bot API answered with `ok: false`. Carries Telegram's own error
    /// code (or the HTTP status when the body was unreadable).
    #[error("telegram api rejected message (code {code}): {description}")]
    Api { code: i64, description: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("seen store query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("seen store unavailable: {0}")]
    Unavailable(String),
}
