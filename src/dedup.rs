//! Dedup gate between fetch and translation. Admission here is
//! provisional; the durable mark happens only after a confirmed send.

use std::collections::HashSet;

use metrics::counter;
use tracing::warn;

use crate::article::Article;
use crate::store::SeenStore;

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub admitted: Vec<Article>,
    pub duplicates: usize,
    /// Candidates dropped because the store could not answer. Failing
    /// closed keeps a flaky store from causing duplicate sends; the
    /// articles come back next cycle.
    pub store_failures: usize,
}

/// Split a candidate batch into new articles and noise. Order of admitted
/// articles follows the input batch. Repeats inside the same batch count
/// as duplicates too, keeping one source from double-submitting a story.
pub async fn partition(store: &dyn SeenStore, batch: Vec<Article>) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();
    let mut in_batch: HashSet<String> = HashSet::new();

    for article in batch {
        if !in_batch.insert(article.identity_key.clone()) {
            outcome.duplicates += 1;
            continue;
        }
        match store.is_seen(&article.identity_key).await {
            Ok(true) => outcome.duplicates += 1,
            Ok(false) => outcome.admitted.push(article),
            Err(e) => {
                warn!(
                    identity_key = %article.identity_key,
                    error = %e,
                    "seen lookup failed, dropping candidate this cycle"
                );
                outcome.store_failures += 1;
            }
        }
    }

    if outcome.duplicates > 0 {
        counter!("relay_duplicates_total").increment(outcome.duplicates as u64);
    }
    if outcome.store_failures > 0 {
        counter!("relay_store_errors_total").increment(outcome.store_failures as u64);
    }
    outcome
}
