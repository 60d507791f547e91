//! Prometheus metrics for the router: retry counts, fanout error rates,
//! and health-check outcomes. Shape matches `ledger_core::metrics::Metrics`.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry, IntCounterVec,
    IntGaugeVec, Registry,
};
use std::sync::Arc;

/// Router metrics collector.
#[derive(Clone)]
pub struct Metrics {
    /// Count of `exec_on`/`query_on` attempts, labeled by shard and outcome.
    pub attempts_total: IntCounterVec,
    /// Count of retries triggered by a transient error, labeled by shard.
    pub retries_total: IntCounterVec,
    /// Last observed health ping result per shard (1 = ok, 0 = down).
    pub shard_up: IntGaugeVec,
    /// Prometheus registry backing these metrics.
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a fresh metrics collector with its own registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let attempts_total = register_int_counter_vec_with_registry!(
            "shard_router_attempts_total",
            "Shard operation attempts",
            &["shard", "outcome"],
            registry
        )?;

        let retries_total = register_int_counter_vec_with_registry!(
            "shard_router_retries_total",
            "Shard operation retries after a transient error",
            &["shard"],
            registry
        )?;

        let shard_up = register_int_gauge_vec_with_registry!(
            "shard_router_shard_up",
            "Whether the last health check for a shard succeeded",
            &["shard"],
            registry
        )?;

        Ok(Self {
            attempts_total,
            retries_total,
            shard_up,
            registry,
        })
    }

    /// Record one attempt's outcome.
    pub fn record_attempt(&self, shard: usize, outcome: &str) {
        self.attempts_total
            .with_label_values(&[&shard.to_string(), outcome])
            .inc();
    }

    /// Record one retry.
    pub fn record_retry(&self, shard: usize) {
        self.retries_total.with_label_values(&[&shard.to_string()]).inc();
    }

    /// Record a health check result.
    pub fn record_health(&self, shard: usize, ok: bool) {
        self.shard_up
            .with_label_values(&[&shard.to_string()])
            .set(if ok { 1 } else { 0 });
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to create shard-router metrics")
    }
}
