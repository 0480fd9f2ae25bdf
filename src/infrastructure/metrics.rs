//! Command cache metrics
//!
//! Emitted through the `metrics` facade; without an installed recorder the
//! calls are no-ops.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::domain::command_cache::CacheSummary;

/// How a lookup ended, as a metric label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Hit,
    Miss,
    /// Embedding match refused by the reranker
    Blocked,
    /// Utterance always takes the full pipeline
    Bypass,
    /// Embedding provider failed or timed out
    Unavailable,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Hit => "hit",
            LookupOutcome::Miss => "miss",
            LookupOutcome::Blocked => "blocked",
            LookupOutcome::Bypass => "bypass",
            LookupOutcome::Unavailable => "unavailable",
        }
    }
}

/// Record a finished lookup
pub fn record_lookup(outcome: LookupOutcome, duration: Duration) {
    let labels = [("outcome", outcome.as_str().to_string())];

    counter!("command_cache_lookups_total", &labels).increment(1);
    histogram!("command_cache_lookup_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Record a store attempt; `outcome` is "stored", "refreshed", "unavailable"
/// or a skip reason
pub fn record_store(outcome: &'static str) {
    counter!("command_cache_stores_total", "outcome" => outcome).increment(1);
}

pub fn record_eviction() {
    counter!("command_cache_evictions_total").increment(1);
}

/// Publish current entry counts
pub fn record_entry_counts(summary: &CacheSummary) {
    gauge!("command_cache_entries", "origin" => "anchor").set(summary.anchor_count as f64);
    gauge!("command_cache_entries", "origin" => "learned").set(summary.learned_count as f64);
    gauge!("command_cache_capacity").set(summary.capacity as f64);
}
