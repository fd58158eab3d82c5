//! Ops surface: health, status, Prometheus text and a guarded manual
//! trigger. This listener is for operators and uptime probes, not readers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::scheduler::{Scheduler, SchedulerStatus, TriggerOutcome};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub metrics: PrometheusHandle,
    pub parse_api_key: Option<String>,
    pub environment: &'static str,
    pub started_at: DateTime<Utc>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(metrics_text))
        // GET kept alongside POST so dumb uptime probes can trigger too.
        .route("/parse", get(trigger_parse).post(trigger_parse))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "cybernews-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/status", "/metrics", "/parse"],
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(json!({
        "status": "healthy",
        "environment": state.environment,
        "uptime_seconds": uptime,
    }))
}

async fn status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.state().snapshot())
}

async fn metrics_text(State(state): State<AppState>) -> String {
    state.metrics.render()
}

async fn trigger_parse(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let Some(expected) = &state.parse_api_key else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "manual trigger disabled, set PARSE_API_KEY" })),
        );
    };

    let provided = bearer_token(&headers).or_else(|| query.get("key").cloned());
    let authorized = provided
        .as_deref()
        .is_some_and(|key| digest_eq(key, expected));
    if !authorized {
        warn!("unauthorized parse request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        );
    }

    match state.scheduler.trigger() {
        TriggerOutcome::Started => (
            StatusCode::OK,
            Json(json!({ "status": "started", "message": "parsing started in background" })),
        ),
        TriggerOutcome::AlreadyRunning => (
            StatusCode::OK,
            Json(json!({ "status": "already_running", "message": "a cycle is already in progress" })),
        ),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

// Comparing digests keeps the comparison time independent of how much of
// the key matched.
fn digest_eq(a: &str, b: &str) -> bool {
    Sha256::digest(a.as_bytes()) == Sha256::digest(b.as_bytes())
}
