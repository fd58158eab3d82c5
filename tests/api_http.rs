// tests/api_http.rs
//
// HTTP-level tests for the ops Router without opening sockets, via
// tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /status
// - GET+POST /parse (disabled, unauthorized, authorized)
// - GET /metrics exposition after a cycle

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use once_cell::sync::Lazy;
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use cybernews_relay::api::{create_router, AppState};
use cybernews_relay::article::Article;
use cybernews_relay::config::{Environment, LogFormat, Settings};
use cybernews_relay::deliver::{Destination, MessageSender};
use cybernews_relay::error::{DeliveryError, SourceError};
use cybernews_relay::metrics::Metrics;
use cybernews_relay::pipeline::Pipeline;
use cybernews_relay::scheduler::Scheduler;
use cybernews_relay::sources::SourceAdapter;
use cybernews_relay::store::MemorySeenStore;
use cybernews_relay::translate::{FixedProvider, Translator};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MiB, plenty for tests

// The Prometheus recorder installs process-wide exactly once.
static METRICS: Lazy<Metrics> = Lazy::new(Metrics::init);

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

struct EmptySource;

#[async_trait]
impl SourceAdapter for EmptySource {
    async fn fetch_latest(&self, _limit: usize) -> Result<Vec<Article>, SourceError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "empty"
    }
}

struct NullSender;

#[async_trait]
impl MessageSender for NullSender {
    async fn send(&self, _destination: Destination, _text: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// State around an idle in-memory pipeline; the scheduler is returned too
/// so tests can watch cycle completion directly.
fn test_state(parse_api_key: Option<&str>) -> (AppState, Arc<Scheduler>) {
    let settings = test_settings();
    let sources: Vec<Box<dyn SourceAdapter>> = vec![Box::new(EmptySource)];
    let pipeline = Arc::new(Pipeline::new(
        &settings,
        sources,
        Arc::new(MemorySeenStore::new()),
        Translator::new(vec![Box::new(FixedProvider { prefix: "ru:" })], "auto", "ru"),
        Arc::new(NullSender),
    ));
    let scheduler = Scheduler::new(pipeline, Duration::from_secs(3600));
    let state = AppState {
        scheduler: Arc::clone(&scheduler),
        metrics: METRICS.handle.clone(),
        parse_api_key: parse_api_key.map(str::to_string),
        environment: "development",
        started_at: Utc::now(),
    };
    (state, scheduler)
}

async fn json_body(resp: axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json body")
}

#[tokio::test]
async fn health_reports_status_and_uptime() {
    let (state, _) = test_state(None);
    let app = create_router(state);

    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    assert_eq!(v["status"], "healthy");
    assert_eq!(v["environment"], "development");
    assert!(v["uptime_seconds"].is_number());
}

#[tokio::test]
async fn status_exposes_the_scheduler_snapshot() {
    let (state, _) = test_state(None);
    let app = create_router(state);

    let resp = app
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .expect("oneshot /status");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    assert_eq!(v["running"], false);
    assert_eq!(v["skipped_ticks"], 0);
    assert!(v["last_report"].is_null(), "no cycle has run yet");
}

#[tokio::test]
async fn parse_is_disabled_without_a_configured_key() {
    let (state, _) = test_state(None);
    let app = create_router(state);

    let resp = app
        .oneshot(Request::post("/parse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn parse_rejects_missing_or_wrong_credentials() {
    let (state, _) = test_state(Some("sekret"));
    let app = create_router(state);

    let resp = app
        .clone()
        .oneshot(Request::post("/parse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(
            Request::post("/parse")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .oneshot(Request::get("/parse?key=wrong").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn parse_accepts_bearer_and_query_credentials() {
    let (state, scheduler) = test_state(Some("sekret"));
    let app = create_router(state);

    let resp = app
        .clone()
        .oneshot(
            Request::post("/parse")
                .header("authorization", "Bearer sekret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert!(
        v["status"] == "started" || v["status"] == "already_running",
        "unexpected trigger status: {v}"
    );

    // Let the background cycle drain before triggering over the query form.
    wait_until_idle(&scheduler).await;

    let resp = app
        .oneshot(Request::get("/parse?key=sekret").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["status"], "started");

    wait_until_idle(&scheduler).await;
    let status = scheduler.state().snapshot();
    assert!(status.last_report.is_some(), "triggered cycle must complete");
}

#[tokio::test]
async fn metrics_exposition_carries_cycle_series() {
    let (state, scheduler) = test_state(Some("sekret"));
    let app = create_router(state);

    // Run one cycle so the counters exist.
    assert_eq!(
        scheduler.trigger(),
        cybernews_relay::scheduler::TriggerOutcome::Started
    );
    wait_until_idle(&scheduler).await;

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    for needle in ["relay_cycles_total", "relay_cycle_ms", "relay_last_cycle_ts"] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
}

async fn wait_until_idle(scheduler: &Arc<Scheduler>) {
    for _ in 0..300 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = scheduler.state().snapshot();
        if !status.running && status.last_started.is_some() {
            return;
        }
    }
    panic!("cycle did not finish in time");
}
