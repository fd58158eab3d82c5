// tests/fetch_fallback.rs
//
// Priority-order fallback semantics of the fetch orchestrator, driven by
// scripted in-memory sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use cybernews_relay::article::Article;
use cybernews_relay::error::SourceError;
use cybernews_relay::fetch::FetchOrchestrator;
use cybernews_relay::sources::SourceAdapter;

enum Script {
    Yield(Vec<Article>),
    Fail,
    Stall(Duration),
}

struct ScriptedSource {
    name: &'static str,
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(name: &'static str, script: Script) -> (Box<dyn SourceAdapter>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = Box::new(Self {
            name,
            script,
            calls: Arc::clone(&calls),
        });
        (source, calls)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    async fn fetch_latest(&self, limit: usize) -> Result<Vec<Article>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Yield(articles) => {
                let mut out = articles.clone();
                out.truncate(limit);
                Ok(out)
            }
            Script::Fail => Err(SourceError::unavailable(self.name, "scripted failure")),
            Script::Stall(pause) => {
                tokio::time::sleep(*pause).await;
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

fn fresh(n: usize) -> Vec<Article> {
    (0..n)
        .map(|i| {
            Article::new(
                "Scripted",
                format!("Scripted headline number {i}"),
                None,
                format!("https://news.example/fresh/{i}"),
                Utc.with_ymd_and_hms(2025, 8, 4, 10, i as u32, 0).unwrap(),
            )
        })
        .collect()
}

fn floor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn orchestrator(
    sources: Vec<Box<dyn SourceAdapter>>,
    max_articles: usize,
    min_per_source: usize,
) -> FetchOrchestrator {
    FetchOrchestrator::new(sources, Duration::from_secs(5), max_articles, min_per_source, floor())
}

#[tokio::test]
async fn satisfied_primary_leaves_the_rest_untouched() {
    let (primary, _) = ScriptedSource::new("primary", Script::Yield(fresh(3)));
    let (secondary, secondary_calls) = ScriptedSource::new("secondary", Script::Yield(fresh(3)));

    let outcome = orchestrator(vec![primary, secondary], 10, 1).collect().await;

    assert_eq!(outcome.candidates.len(), 3);
    assert_eq!(outcome.sources_tried, 1);
    assert_eq!(outcome.sources_failed, 0);
    assert!(!outcome.degraded());
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 0, "secondary must stay idle");
}

#[tokio::test]
async fn failure_falls_through_to_the_next_source() {
    let (primary, primary_calls) = ScriptedSource::new("primary", Script::Fail);
    let (secondary, secondary_calls) = ScriptedSource::new("secondary", Script::Yield(fresh(2)));

    let outcome = orchestrator(vec![primary, secondary], 10, 1).collect().await;

    assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.candidates.len(), 2);
    assert_eq!(outcome.sources_tried, 2);
    assert_eq!(outcome.sources_failed, 1);
    assert!(!outcome.degraded());
}

#[tokio::test]
async fn empty_source_is_not_a_failure_but_still_falls_through() {
    let (primary, _) = ScriptedSource::new("primary", Script::Yield(Vec::new()));
    let (secondary, secondary_calls) = ScriptedSource::new("secondary", Script::Yield(fresh(1)));

    let outcome = orchestrator(vec![primary, secondary], 10, 1).collect().await;

    assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.candidates.len(), 1);
    assert_eq!(outcome.sources_failed, 0, "an empty batch is a normal outcome");
    assert!(!outcome.degraded());
}

#[tokio::test]
async fn all_sources_failing_is_a_degraded_cycle() {
    let (a, _) = ScriptedSource::new("a", Script::Fail);
    let (b, _) = ScriptedSource::new("b", Script::Fail);

    let outcome = orchestrator(vec![a, b], 10, 1).collect().await;

    assert!(outcome.candidates.is_empty());
    assert_eq!(outcome.sources_tried, 2);
    assert_eq!(outcome.sources_failed, 2);
    assert!(outcome.degraded());
}

#[tokio::test]
async fn stale_articles_never_leave_the_orchestrator() {
    let mut batch = fresh(1);
    batch.push(Article::new(
        "Scripted",
        "An article from the previous year",
        None,
        "https://news.example/stale/1",
        Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 0).unwrap(),
    ));
    let (source, _) = ScriptedSource::new("primary", Script::Yield(batch));

    let outcome = orchestrator(vec![source], 10, 1).collect().await;

    assert_eq!(outcome.candidates.len(), 1);
    assert!(outcome.candidates[0].published_at >= floor());
}

#[tokio::test]
async fn batch_is_capped_at_the_cycle_limit() {
    let (source, _) = ScriptedSource::new("primary", Script::Yield(fresh(8)));

    let outcome = orchestrator(vec![source], 3, 1).collect().await;

    assert_eq!(outcome.candidates.len(), 3);
}

#[tokio::test]
async fn thin_primary_is_topped_up_by_the_next_source() {
    // min_per_source of 2 means a single-article yield is not enough.
    let (primary, _) = ScriptedSource::new("primary", Script::Yield(fresh(1)));
    let (secondary, secondary_calls) = ScriptedSource::new("secondary", Script::Yield(fresh(3)));

    let outcome = orchestrator(vec![primary, secondary], 10, 2).collect().await;

    assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
    assert!(outcome.candidates.len() >= 2);
    assert_eq!(outcome.sources_tried, 2);
}

#[tokio::test(start_paused = true)]
async fn stalled_source_times_out_and_falls_through() {
    let (primary, _) = ScriptedSource::new("primary", Script::Stall(Duration::from_secs(60)));
    let (secondary, secondary_calls) = ScriptedSource::new("secondary", Script::Yield(fresh(1)));

    let outcome = orchestrator(vec![primary, secondary], 10, 1).collect().await;

    assert_eq!(outcome.sources_failed, 1, "a timeout counts as a source failure");
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.candidates.len(), 1);
}
