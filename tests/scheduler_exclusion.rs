// tests/scheduler_exclusion.rs
//
// One cycle at a time: overlapping triggers are rejected, the tick loop
// fires a startup cycle, and retention cleanup prunes the seen store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use cybernews_relay::article::Article;
use cybernews_relay::config::{Environment, LogFormat, Settings};
use cybernews_relay::deliver::{Destination, MessageSender};
use cybernews_relay::error::{DeliveryError, SourceError};
use cybernews_relay::pipeline::Pipeline;
use cybernews_relay::scheduler::{spawn_cleanup, Scheduler, TriggerOutcome};
use cybernews_relay::sources::SourceAdapter;
use cybernews_relay::store::{MemorySeenStore, SeenRecord, SeenStore};
use cybernews_relay::translate::{FixedProvider, Translator};

fn test_settings() -> Settings {
    Settings {
        telegram_bot_token: "123456:TEST-TOKEN".into(),
        telegram_group_id: -100200,
        telegram_topic_id: None,
        telegram_vulnerabilities_group_id: None,
        telegram_vulnerabilities_topic_id: None,
        database_url: "postgres://unused".into(),
        seen_retention_days: 90,
        parse_interval: Duration::from_secs(1800),
        max_articles_per_fetch: 10,
        max_articles_per_category: 5,
        min_articles_per_source: 1,
        request_timeout: Duration::from_secs(5),
        min_article_date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        send_delay: Duration::ZERO,
        send_untranslated_on_failure: true,
        translation_source_language: "auto".into(),
        translation_target_language: "ru".into(),
        microsoft_translator_key: None,
        user_agent: "test-agent".into(),
        force_ipv4: false,
        proxy_url: None,
        proxy_username: None,
        proxy_password: None,
        bind_addr: "0.0.0.0:8000".parse().unwrap(),
        parse_api_key: None,
        environment: Environment::Development,
        log_format: LogFormat::Console,
    }
}

/// Yields nothing, slowly. Keeps a cycle in flight long enough to observe
/// the running flag.
struct StallSource {
    pause: Duration,
}

#[async_trait]
impl SourceAdapter for StallSource {
    async fn fetch_latest(&self, _limit: usize) -> Result<Vec<Article>, SourceError> {
        tokio::time::sleep(self.pause).await;
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "stall"
    }
}

struct NullSender;

#[async_trait]
impl MessageSender for NullSender {
    async fn send(&self, _destination: Destination, _text: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}

fn pipeline_stalling_for(pause: Duration) -> Arc<Pipeline> {
    let settings = test_settings();
    let sources: Vec<Box<dyn SourceAdapter>> = vec![Box::new(StallSource { pause })];
    Arc::new(Pipeline::new(
        &settings,
        sources,
        Arc::new(MemorySeenStore::new()),
        Translator::new(vec![Box::new(FixedProvider { prefix: "ru:" })], "auto", "ru"),
        Arc::new(NullSender),
    ))
}

async fn wait_until_idle(scheduler: &Arc<Scheduler>) {
    for _ in 0..300 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if !scheduler.state().snapshot().running {
            return;
        }
    }
    panic!("cycle did not finish in time");
}

#[tokio::test]
async fn overlapping_triggers_are_rejected_until_the_cycle_finishes() {
    let scheduler = Scheduler::new(
        pipeline_stalling_for(Duration::from_millis(200)),
        Duration::from_secs(3600),
    );

    assert_eq!(scheduler.trigger(), TriggerOutcome::Started);
    assert_eq!(scheduler.trigger(), TriggerOutcome::AlreadyRunning);

    let status = scheduler.state().snapshot();
    assert!(status.running);
    assert_eq!(status.skipped_ticks, 1);

    wait_until_idle(&scheduler).await;

    // Once the cycle is over, the guard opens again.
    assert_eq!(scheduler.trigger(), TriggerOutcome::Started);
    wait_until_idle(&scheduler).await;

    let status = scheduler.state().snapshot();
    assert!(!status.running);
    assert!(status.last_started.is_some());
    assert!(status.last_success.is_some());
    let report = status.last_report.expect("report recorded after success");
    assert_eq!(report.fetched, 0);
    assert!(!report.degraded);
}

#[tokio::test]
async fn tick_loop_runs_a_startup_cycle_immediately() {
    let scheduler = Scheduler::new(
        pipeline_stalling_for(Duration::from_millis(1)),
        Duration::from_secs(3600),
    );
    let handle = Arc::clone(&scheduler).spawn();

    let mut report = None;
    for _ in 0..300 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        report = scheduler.state().snapshot().last_report;
        if report.is_some() {
            break;
        }
    }
    handle.abort();

    let report = report.expect("startup cycle must complete without waiting an interval");
    assert_eq!(report.fetched, 0);
    assert!(scheduler.state().snapshot().last_started.is_some());
}

#[tokio::test]
async fn cleanup_task_prunes_old_seen_records_at_startup() {
    let store = Arc::new(MemorySeenStore::new());
    let now = Utc::now();
    store
        .commit_seen(&SeenRecord {
            identity_key: "old".into(),
            source_name: "TheHackerNews".into(),
            url: "https://news.example/old".into(),
            delivered_at: now - chrono::Duration::days(365),
        })
        .await
        .unwrap();
    store
        .commit_seen(&SeenRecord {
            identity_key: "fresh".into(),
            source_name: "TheHackerNews".into(),
            url: "https://news.example/fresh".into(),
            delivered_at: now,
        })
        .await
        .unwrap();

    let handle = spawn_cleanup(store.clone(), 90);
    for _ in 0..300 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if store.len() == 1 {
            break;
        }
    }
    handle.abort();

    assert_eq!(store.committed_keys(), vec!["fresh".to_string()]);
}
