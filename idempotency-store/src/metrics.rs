//! Prometheus metrics for the idempotency store: hit/miss/wait counts.

use prometheus::{register_int_counter_vec_with_registry, IntCounterVec, Registry};
use std::sync::Arc;

/// Idempotency-store metrics collector.
#[derive(Clone)]
pub struct Metrics {
    /// Count of `check_or_begin` outcomes, labeled by outcome (`no_key`,
    /// `proceed`, `hit`, `hit_after_wait`, `hash_collision_hit`,
    /// `concurrent_timeout`, `malformed_key`).
    pub lookups_total: IntCounterVec,
    /// Prometheus registry backing these metrics.
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a fresh metrics collector with its own registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let lookups_total = register_int_counter_vec_with_registry!(
            "idempotency_store_lookups_total",
            "check_or_begin outcomes",
            &["outcome"],
            registry
        )?;

        Ok(Self {
            lookups_total,
            registry,
        })
    }

    /// Record one `check_or_begin` outcome.
    pub fn record(&self, outcome: &str) {
        self.lookups_total.with_label_values(&[outcome]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to create idempotency-store metrics")
    }
}
