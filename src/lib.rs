// src/lib.rs
// Public library surface for integration tests (and the binaries).

pub mod api;
pub mod article;
pub mod categorize;
pub mod config;
pub mod dedup;
pub mod deliver;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod telegram;
pub mod translate;

// ---- Re-exports for the common wiring path ----
pub use crate::article::{Article, Category, DeliveryState};
pub use crate::config::Settings;
pub use crate::pipeline::{CycleReport, Pipeline};
pub use crate::scheduler::Scheduler;
pub use crate::store::{MemorySeenStore, PgSeenStore, SeenRecord, SeenStore};
