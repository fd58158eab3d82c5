//! One relay cycle: fetch candidates, categorize, drop what was already
//! delivered, translate, deliver, report. Stages degrade independently;
//! the cycle itself only fails on bugs, not on upstream weather.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tracing::{info, warn};

use crate::categorize::categorize;
use crate::config::Settings;
use crate::dedup;
use crate::deliver::{Dispatcher, MessageSender, Routes};
use crate::fetch::FetchOrchestrator;
use crate::metrics::ensure_metrics_described;
use crate::sources::SourceAdapter;
use crate::store::SeenStore;
use crate::translate::{translate_batch, Translator};

/// What one cycle did, stage by stage. Serialized as-is on the status
/// endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub sources_tried: usize,
    pub sources_failed: usize,
    pub duplicates: usize,
    pub store_failures: usize,
    pub admitted: usize,
    pub translation_failures: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub held_untranslated: usize,
    pub capped: usize,
    pub commit_failures: usize,
    /// Every source failed; the cycle produced nothing for upstream reasons.
    pub degraded: bool,
    pub duration_ms: u64,
}

pub struct Pipeline {
    orchestrator: FetchOrchestrator,
    store: Arc<dyn SeenStore>,
    translator: Translator,
    sender: Arc<dyn MessageSender>,
    routes: Routes,
    max_per_category: usize,
    send_delay: std::time::Duration,
    send_untranslated: bool,
}

impl Pipeline {
    pub fn new(
        settings: &Settings,
        sources: Vec<Box<dyn SourceAdapter>>,
        store: Arc<dyn SeenStore>,
        translator: Translator,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            orchestrator: FetchOrchestrator::from_settings(settings, sources),
            store,
            translator,
            sender,
            routes: Routes::from_settings(settings),
            max_per_category: settings.max_articles_per_category,
            send_delay: settings.send_delay,
            send_untranslated: settings.send_untranslated_on_failure,
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        ensure_metrics_described();
        let started = Instant::now();

        let fetch = self.orchestrator.collect().await;
        let mut report = CycleReport {
            fetched: fetch.candidates.len(),
            sources_tried: fetch.sources_tried,
            sources_failed: fetch.sources_failed,
            degraded: fetch.degraded(),
            ..CycleReport::default()
        };
        if report.degraded {
            warn!(
                sources_tried = report.sources_tried,
                "every source failed this cycle"
            );
        }

        let mut candidates = fetch.candidates;
        for article in &mut candidates {
            article.category = categorize(article);
        }

        let gate = dedup::partition(self.store.as_ref(), candidates).await;
        report.duplicates = gate.duplicates;
        report.store_failures = gate.store_failures;
        report.admitted = gate.admitted.len();

        let (translated, translation_failures) =
            translate_batch(&self.translator, gate.admitted).await;
        report.translation_failures = translation_failures;

        let dispatcher = Dispatcher::new(
            self.sender.as_ref(),
            self.store.as_ref(),
            self.routes,
            self.max_per_category,
            self.send_delay,
            self.send_untranslated,
        );
        let delivery = dispatcher.dispatch(translated).await;
        report.delivered = delivery.delivered;
        report.delivery_failures = delivery.failed;
        report.held_untranslated = delivery.held_untranslated;
        report.capped = delivery.capped;
        report.commit_failures = delivery.commit_failures;

        report.duration_ms = started.elapsed().as_millis() as u64;
        histogram!("relay_cycle_ms").record(report.duration_ms as f64);
        gauge!("relay_last_cycle_ts").set(chrono::Utc::now().timestamp() as f64);
        counter!("relay_cycles_total").increment(1);
        if report.degraded {
            counter!("relay_cycles_degraded_total").increment(1);
        }

        info!(
            fetched = report.fetched,
            duplicates = report.duplicates,
            admitted = report.admitted,
            delivered = report.delivered,
            failed = report.delivery_failures,
            duration_ms = report.duration_ms,
            "cycle finished"
        );
        Ok(report)
    }
}
