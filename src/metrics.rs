use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once, at startup,
    /// before the first cycle.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        ensure_metrics_described();
        Self { handle }
    }
}

/// One-time metrics registration (so series show up on /metrics before
/// their first increment).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_cycles_total", "Cycles finished, any outcome.");
        describe_counter!("relay_cycles_failed_total", "Cycles that errored or panicked.");
        describe_counter!(
            "relay_cycles_degraded_total",
            "Cycles in which every source failed."
        );
        describe_counter!(
            "relay_cycles_skipped_total",
            "Ticks skipped because a cycle was still running."
        );
        describe_counter!(
            "relay_articles_fetched_total",
            "Candidates fetched, after the date floor."
        );
        describe_counter!(
            "relay_articles_stale_total",
            "Fetched articles dropped by the date floor."
        );
        describe_counter!("relay_source_errors_total", "Source fetch failures or timeouts.");
        describe_counter!("relay_duplicates_total", "Candidates dropped as already seen.");
        describe_counter!(
            "relay_store_errors_total",
            "Candidates dropped because the seen store could not answer."
        );
        describe_counter!(
            "relay_translation_provider_errors_total",
            "Individual translation provider failures."
        );
        describe_counter!(
            "relay_translation_failures_total",
            "Articles whose whole provider chain failed."
        );
        describe_counter!("relay_articles_delivered_total", "Confirmed Telegram sends.");
        describe_counter!("relay_delivery_errors_total", "Telegram sends that failed.");
        describe_counter!(
            "relay_seen_commit_failures_total",
            "Seen commits that failed after a confirmed send."
        );
        describe_counter!(
            "relay_cleanup_removed_total",
            "Seen records dropped by retention cleanup."
        );
        describe_histogram!("relay_fetch_ms", "Per-source fetch time in milliseconds.");
        describe_histogram!("relay_cycle_ms", "Whole-cycle duration in milliseconds.");
        describe_gauge!("relay_last_cycle_ts", "Unix ts when a cycle last finished.");
        describe_gauge!("relay_last_delivery_ts", "Unix ts of the last confirmed send.");
    });
}
