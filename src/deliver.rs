//! Delivery dispatch. The pipeline's only durable side effect happens
//! here, and strictly in this order: send first, then commit the seen
//! record. A crash between the two costs at worst one duplicate next
//! cycle; the reverse order would silently swallow articles.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, gauge};
use tracing::{debug, error, info, warn};

use crate::article::{Article, Category, DeliveryState};
use crate::config::Settings;
use crate::error::DeliveryError;
use crate::store::{SeenRecord, SeenStore};
use crate::telegram::format_article;

/// One Telegram chat, optionally a forum topic inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub chat_id: i64,
    pub topic_id: Option<i64>,
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, destination: Destination, text: &str) -> Result<(), DeliveryError>;
}

/// Category-to-chat routing. Vulnerabilities fall back to the general
/// group when no dedicated one is configured.
#[derive(Debug, Clone, Copy)]
pub struct Routes {
    pub general: Destination,
    pub vulnerabilities: Option<Destination>,
}

impl Routes {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            general: Destination {
                chat_id: settings.telegram_group_id,
                topic_id: settings.telegram_topic_id,
            },
            vulnerabilities: settings.telegram_vulnerabilities_group_id.map(|chat_id| {
                Destination {
                    chat_id,
                    topic_id: settings.telegram_vulnerabilities_topic_id,
                }
            }),
        }
    }

    pub fn destination_for(&self, category: Category) -> Destination {
        match category {
            Category::General => self.general,
            Category::Vulnerabilities => self.vulnerabilities.unwrap_or(self.general),
        }
    }
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DeliveryOutcome {
    pub delivered: usize,
    pub failed: usize,
    /// Held back by policy because translation failed; they return next
    /// cycle since nothing was committed.
    pub held_untranslated: usize,
    /// Over the per-category cap this cycle; also uncommitted, also retried.
    pub capped: usize,
    /// Sends that succeeded but whose seen commit failed. Each one may
    /// produce a duplicate next cycle.
    pub commit_failures: usize,
}

pub struct Dispatcher<'a> {
    sender: &'a dyn MessageSender,
    store: &'a dyn SeenStore,
    routes: Routes,
    max_per_category: usize,
    send_delay: Duration,
    send_untranslated: bool,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        sender: &'a dyn MessageSender,
        store: &'a dyn SeenStore,
        routes: Routes,
        max_per_category: usize,
        send_delay: Duration,
        send_untranslated: bool,
    ) -> Self {
        Self {
            sender,
            store,
            routes,
            max_per_category: max_per_category.max(1),
            send_delay,
            send_untranslated,
        }
    }

    /// Deliver a cycle's batch, oldest first so the group reads as a
    /// timeline. Every confirmed send is committed before the next article
    /// is attempted.
    pub async fn dispatch(&self, mut articles: Vec<Article>) -> DeliveryOutcome {
        articles.sort_by(|a, b| a.published_at.cmp(&b.published_at));

        let mut outcome = DeliveryOutcome::default();
        let mut sent_per_category: HashMap<Category, usize> = HashMap::new();
        let mut attempted_any = false;

        for mut article in articles {
            if article.translated_title.is_none() && !self.send_untranslated {
                debug!(url = %article.url, "held untranslated article for next cycle");
                outcome.held_untranslated += 1;
                continue;
            }

            let category = article.category;
            let sent = *sent_per_category.get(&category).unwrap_or(&0);
            if sent >= self.max_per_category {
                debug!(
                    url = %article.url,
                    category = category.as_str(),
                    "category cap reached, deferring article"
                );
                outcome.capped += 1;
                continue;
            }

            if attempted_any && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            attempted_any = true;

            let destination = self.routes.destination_for(category);
            let text = format_article(&article);
            match self.sender.send(destination, &text).await {
                Ok(()) => {
                    article.state = DeliveryState::Delivered;
                    sent_per_category.insert(category, sent + 1);
                    outcome.delivered += 1;
                    counter!("relay_articles_delivered_total").increment(1);
                    gauge!("relay_last_delivery_ts").set(Utc::now().timestamp() as f64);
                    info!(
                        url = %article.url,
                        source = %article.source_name,
                        category = category.as_str(),
                        "article delivered"
                    );

                    let record = SeenRecord {
                        identity_key: article.identity_key.clone(),
                        source_name: article.source_name.clone(),
                        url: article.url.clone(),
                        delivered_at: Utc::now(),
                    };
                    if let Err(e) = self.store.commit_seen(&record).await {
                        error!(
                            identity_key = %record.identity_key,
                            error = %e,
                            "seen commit failed after send, duplicate possible next cycle"
                        );
                        outcome.commit_failures += 1;
                        counter!("relay_seen_commit_failures_total").increment(1);
                    }
                }
                Err(e) => {
                    article.state = DeliveryState::Failed;
                    outcome.failed += 1;
                    counter!("relay_delivery_errors_total").increment(1);
                    warn!(
                        url = %article.url,
                        error = %e,
                        "delivery failed, article left uncommitted"
                    );
                }
            }
        }
        outcome
    }
}
