//! Cache and rate-limit metrics.
//!
//! Emitted through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use crate::ConnectionState;
use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Metric names.
pub mod names {
    /// Cache lookups answered from the store.
    pub const CACHE_HITS_TOTAL: &str = "bc_cache_hits_total";
    /// Cache lookups that found nothing (or could not ask).
    pub const CACHE_MISSES_TOTAL: &str = "bc_cache_misses_total";
    /// Successful cache writes.
    pub const CACHE_WRITES_TOTAL: &str = "bc_cache_writes_total";
    /// Failed cache operations, by operation.
    pub const CACHE_ERRORS_TOTAL: &str = "bc_cache_errors_total";
    /// Keys removed by pattern invalidation.
    pub const CACHE_INVALIDATED_KEYS_TOTAL: &str = "bc_cache_invalidated_keys_total";
    /// Rate-limit decisions, by outcome.
    pub const RATE_LIMIT_DECISIONS_TOTAL: &str = "bc_rate_limit_decisions_total";
    /// Current store connection state (0 disconnected, 1 connecting, 2 ready).
    pub const STORE_STATE: &str = "bc_store_state";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::CACHE_HITS_TOTAL, "Total cache lookups served from the store");
    describe_counter!(names::CACHE_MISSES_TOTAL, "Total cache lookups that missed");
    describe_counter!(names::CACHE_WRITES_TOTAL, "Total successful cache writes");
    describe_counter!(names::CACHE_ERRORS_TOTAL, "Total cache operations that failed and degraded");
    describe_counter!(
        names::CACHE_INVALIDATED_KEYS_TOTAL,
        "Total keys deleted by pattern invalidation"
    );
    describe_counter!(
        names::RATE_LIMIT_DECISIONS_TOTAL,
        "Total rate-limit decisions by outcome"
    );
    describe_gauge!(names::STORE_STATE, "Store connection state");
}

/// Cache metrics recorder.
#[derive(Clone)]
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a cache hit.
    pub fn hit() {
        counter!(names::CACHE_HITS_TOTAL).increment(1);
    }

    /// Record a cache miss.
    pub fn miss() {
        counter!(names::CACHE_MISSES_TOTAL).increment(1);
    }

    /// Record a successful write.
    pub fn write() {
        counter!(names::CACHE_WRITES_TOTAL).increment(1);
    }

    /// Record a degraded operation.
    pub fn error(operation: &'static str) {
        counter!(names::CACHE_ERRORS_TOTAL, "operation" => operation).increment(1);
    }

    /// Record keys removed by a pattern delete.
    pub fn invalidated(count: u64) {
        counter!(names::CACHE_INVALIDATED_KEYS_TOTAL).increment(count);
    }

    /// Record a rate-limit decision.
    pub fn rate_limit(outcome: &'static str) {
        counter!(names::RATE_LIMIT_DECISIONS_TOTAL, "outcome" => outcome).increment(1);
    }

    /// Record a store state transition.
    pub fn store_state(state: ConnectionState) {
        gauge!(names::STORE_STATE).set(f64::from(state as u8));
    }
}
