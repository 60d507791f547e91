//! Prometheus metrics for the audit writer: rows written, by severity.

use prometheus::{register_int_counter_vec_with_registry, IntCounterVec, Registry};
use std::sync::Arc;

/// Audit-writer metrics collector.
#[derive(Clone)]
pub struct Metrics {
    /// Count of audit rows written, labeled by severity.
    pub entries_total: IntCounterVec,
    /// Prometheus registry backing these metrics.
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a fresh metrics collector with its own registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let entries_total = register_int_counter_vec_with_registry!(
            "audit_log_entries_total",
            "Audit entries recorded",
            &["severity"],
            registry
        )?;

        Ok(Self {
            entries_total,
            registry,
        })
    }

    /// Record one audit entry written.
    pub fn record(&self, severity: &str) {
        self.entries_total.with_label_values(&[severity]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to create audit-log metrics")
    }
}
