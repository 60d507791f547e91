//! Prometheus metrics for the coordinator: outcome counts per
//! `Coordinator::execute` call. Shape matches `shard_router::metrics::Metrics`.

use prometheus::{register_int_counter_vec_with_registry, IntCounterVec, Registry};
use std::sync::Arc;

/// Coordinator metrics collector.
#[derive(Clone)]
pub struct Metrics {
    /// Count of `execute` outcomes, labeled by outcome
    /// (`committed`, `rolled_back`, `partially_committed`, `timeout`,
    /// `cancelled`, `nested_rejected`).
    pub outcomes_total: IntCounterVec,
    /// Prometheus registry backing these metrics.
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a fresh metrics collector with its own registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let outcomes_total = register_int_counter_vec_with_registry!(
            "tx_coordinator_outcomes_total",
            "Coordinator execute() outcomes",
            &["outcome"],
            registry
        )?;

        Ok(Self {
            outcomes_total,
            registry,
        })
    }

    /// Record one `execute` outcome.
    pub fn record_outcome(&self, outcome: &str) {
        self.outcomes_total.with_label_values(&[outcome]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to create tx-coordinator metrics")
    }
}
