//! `AuditWriter::record` and the best-effort `PartiallyCommitted` path.

use crate::error::Result;
use crate::metrics::Metrics;
use crate::types::{AuditEntry, AuditSeverity, AuditStatus};
use ledger_model::TransactionId;
use shard_router::{ShardIndex, ShardRouter};
use std::sync::Arc;
use tracing::instrument;
use tx_coordinator::TxHandle;
use uuid::Uuid;

const INSERT_AUDIT_SQL: &str = "INSERT INTO audit_logs \
     (entity_type, entity_id, operation, actor_id, before_state, after_state, \
      reason, status, severity, transaction_id, occurred_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

fn audit_args(entry: &AuditEntry) -> Vec<ledger_model::sql::SqlValue> {
    vec![
        entry.entity_type.clone().into(),
        entry.entity_id.into(),
        entry.operation.clone().into(),
        entry.actor_id.into(),
        entry.before.clone().map(Into::into).unwrap_or(ledger_model::sql::SqlValue::Null),
        entry.after.clone().map(Into::into).unwrap_or(ledger_model::sql::SqlValue::Null),
        entry
            .reason
            .clone()
            .map(Into::into)
            .unwrap_or(ledger_model::sql::SqlValue::Null),
        status_label(entry.status).into(),
        severity_label(entry.severity).into(),
        entry
            .transaction_id
            .map(|id| ledger_model::sql::SqlValue::Uuid(id.as_uuid()))
            .unwrap_or(ledger_model::sql::SqlValue::Null),
        entry.timestamp.into(),
    ]
}

fn status_label(status: AuditStatus) -> &'static str {
    match status {
        AuditStatus::Success => "success",
        AuditStatus::Failed => "failed",
        AuditStatus::Denied => "denied",
    }
}

fn severity_label(severity: AuditSeverity) -> &'static str {
    match severity {
        AuditSeverity::Info => "info",
        AuditSeverity::Warning => "warning",
        AuditSeverity::Error => "error",
        AuditSeverity::Critical => "critical",
    }
}

/// The audit writer (spec §4.6).
pub struct AuditWriter {
    router: Arc<ShardRouter>,
    metrics: Metrics,
}

impl AuditWriter {
    /// Construct a writer over `router`'s shard set.
    pub fn new(router: Arc<ShardRouter>) -> Self {
        Self {
            router,
            metrics: Metrics::new().expect("failed to initialize audit-log metrics"),
        }
    }

    /// Writer metrics, for exposition by the embedding binary.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Write `entry` inside the coordinator transaction already open on
    /// `shard` via `tx` — spec §4.6's core guarantee: a successful mutation
    /// is never un-audited, because the audit row commits or rolls back
    /// with the state change it describes.
    #[instrument(skip(self, tx, entry))]
    pub async fn record(&self, tx: &TxHandle<'_>, shard: ShardIndex, entry: &AuditEntry) -> Result<()> {
        tx.exec_on(shard, INSERT_AUDIT_SQL, &audit_args(entry)).await?;
        self.metrics.record(severity_label(entry.severity));
        Ok(())
    }

    /// Write `entry` directly through the router, outside any transaction.
    /// The only legitimate caller is the `PartiallyCommitted` path below:
    /// once the coordinator's own per-shard transactions are gone (some
    /// committed, some rolled back), there is no single transaction left to
    /// write the critical entry inside, so the write is deliberately
    /// best-effort.
    #[instrument(skip(self, entry))]
    pub async fn record_standalone(&self, shard: ShardIndex, entry: &AuditEntry) -> Result<()> {
        self.router.exec_on(shard, INSERT_AUDIT_SQL, &audit_args(entry)).await?;
        self.metrics.record(severity_label(entry.severity));
        Ok(())
    }

    /// Record a `Critical` entry naming every shard a `PartiallyCommitted`
    /// coordinator call touched, fanned out best-effort to each one still
    /// reachable (spec §4.2 step 4, §8 scenario S4: "an audit entry of
    /// severity CRITICAL exists naming both shards and the transaction id").
    pub async fn record_partial_commit(
        &self,
        transaction_id: TransactionId,
        shards: &[ShardIndex],
        detail: impl Into<String>,
    ) {
        let detail = detail.into();
        let entry = AuditEntry {
            entity_type: "coordinator_transaction".to_string(),
            entity_id: transaction_id.as_uuid(),
            operation: "commit".to_string(),
            actor_id: Uuid::nil(),
            before: None,
            after: Some(serde_json::json!({ "shards": shards, "detail": detail })),
            reason: Some(detail),
            status: AuditStatus::Failed,
            severity: AuditSeverity::Critical,
            transaction_id: Some(transaction_id),
            timestamp: chrono::Utc::now(),
        };
        for &shard in shards {
            if let Err(e) = self.record_standalone(shard, &entry).await {
                tracing::error!(shard, error = %e, "failed to write PartiallyCommitted audit row; reconciliation must proceed from logs alone for this shard");
            }
        }
    }
}
