//! Durable record of delivered articles. This is the only state the relay
//! keeps between cycles, and the at-most-once guarantee rests on it: a key
//! is committed here immediately after a confirmed send, never before.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::StoreError;

/// What gets committed after a confirmed delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct SeenRecord {
    pub identity_key: String,
    pub source_name: String,
    pub url: String,
    pub delivered_at: DateTime<Utc>,
}

#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Whether this identity key was ever committed as delivered.
    async fn is_seen(&self, identity_key: &str) -> Result<bool, StoreError>;

    /// Record a confirmed delivery. Idempotent: re-committing an existing
    /// key is a no-op, not an error.
    async fn commit_seen(&self, record: &SeenRecord) -> Result<(), StoreError>;

    /// Drop records delivered before `cutoff`. Returns rows removed.
    async fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

pub struct PgSeenStore {
    pool: PgPool,
}

impl PgSeenStore {
    /// Connect and make sure the schema exists. The table is tiny and
    /// self-describing, so DDL lives here instead of a migration tool.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS seen_articles (
                 identity_key TEXT PRIMARY KEY,
                 source       TEXT NOT NULL,
                 url          TEXT NOT NULL,
                 delivered_at TIMESTAMPTZ NOT NULL
             )",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS seen_articles_delivered_at_idx
             ON seen_articles (delivered_at)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl SeenStore for PgSeenStore {
    async fn is_seen(&self, identity_key: &str) -> Result<bool, StoreError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM seen_articles WHERE identity_key = $1)",
        )
        .bind(identity_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn commit_seen(&self, record: &SeenRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO seen_articles (identity_key, source, url, delivered_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (identity_key) DO NOTHING",
        )
        .bind(&record.identity_key)
        .bind(&record.source_name)
        .bind(&record.url)
        .bind(record.delivered_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM seen_articles WHERE delivered_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// In-memory store for tests and dry runs. Same contract, no durability.
#[derive(Default)]
pub struct MemorySeenStore {
    records: Mutex<HashMap<String, SeenRecord>>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("seen mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn committed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .records
            .lock()
            .expect("seen mutex poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl SeenStore for MemorySeenStore {
    async fn is_seen(&self, identity_key: &str) -> Result<bool, StoreError> {
        Ok(self
            .records
            .lock()
            .expect("seen mutex poisoned")
            .contains_key(identity_key))
    }

    async fn commit_seen(&self, record: &SeenRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .expect("seen mutex poisoned")
            .entry(record.identity_key.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self.records.lock().expect("seen mutex poisoned");
        let before = records.len();
        records.retain(|_, rec| rec.delivered_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}
