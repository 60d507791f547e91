//! `AuditEntry` and its severity ladder (spec §3, §4.6).

use chrono::{DateTime, Utc};
use ledger_model::TransactionId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity ladder for an audit entry, matching the teacher's
/// `security::audit_log::AuditSeverity` ordering (so a `PartiallyCommitted`
/// row sorts above any ordinary state-transition entry in operator
/// tooling that orders by severity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    /// Routine state transition.
    Info,
    /// Worth a human glance but not actionable on its own.
    Warning,
    /// A request failed; no data was corrupted.
    Error,
    /// An operational incident requiring manual reconciliation (spec
    /// §4.2's `PartiallyCommitted`).
    Critical,
}

/// Outcome of the operation this entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The operation succeeded.
    Success,
    /// The operation failed (validation, policy, or state error).
    Failed,
    /// The actor lacked permission; surfaced from the external layer per
    /// spec §4.6 ("every permission-denied attempt").
    Denied,
}

/// One append-only audit row (spec §3). Entity-generic: the financial
/// engine is the only writer, and names the entity type as a plain string
/// (`"investment"`, `"escrow_account"`, ...) rather than a closed enum, so
/// adding a new auditable entity never requires a change here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Kind of entity this entry is about (`"investment"`, `"disbursement"`, ...).
    pub entity_type: String,
    /// Identifier of the entity, as raw bytes (the sharding key).
    pub entity_id: Uuid,
    /// The operation performed (`"approve_investment"`, `"disburse"`, ...).
    pub operation: String,
    /// The actor who performed it (a `UserId`, or a system-generated id
    /// for coordinator-originated entries like `PartiallyCommitted`).
    pub actor_id: Uuid,
    /// Entity state before the operation, if applicable.
    pub before: Option<serde_json::Value>,
    /// Entity state after the operation, if applicable.
    pub after: Option<serde_json::Value>,
    /// Free-text reason (required for rejections; optional otherwise).
    pub reason: Option<String>,
    /// Outcome of the operation.
    pub status: AuditStatus,
    /// Severity for operator triage.
    pub severity: AuditSeverity,
    /// The coordinator transaction this entry was written inside, if any.
    pub transaction_id: Option<TransactionId>,
    /// When this entry was recorded.
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Build an `Info`-severity, `Success`-status entry — the common case
    /// for a state transition that completed normally.
    pub fn success(entity_type: impl Into<String>, entity_id: Uuid, operation: impl Into<String>, actor_id: Uuid) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
            operation: operation.into(),
            actor_id,
            before: None,
            after: None,
            reason: None,
            status: AuditStatus::Success,
            severity: AuditSeverity::Info,
            transaction_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a before/after snapshot.
    pub fn with_snapshot(mut self, before: Option<serde_json::Value>, after: Option<serde_json::Value>) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    /// Attach a reason (required on rejections).
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Override status and severity together (e.g. `Failed`/`Error`).
    pub fn with_status(mut self, status: AuditStatus, severity: AuditSeverity) -> Self {
        self.status = status;
        self.severity = severity;
        self
    }

    /// Attach the coordinator transaction id this entry is written inside.
    pub fn with_transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_critical_above_routine_entries() {
        assert!(AuditSeverity::Critical > AuditSeverity::Error);
        assert!(AuditSeverity::Error > AuditSeverity::Warning);
        assert!(AuditSeverity::Warning > AuditSeverity::Info);
    }

    #[test]
    fn success_builds_an_info_success_entry_by_default() {
        let entry = AuditEntry::success("investment", Uuid::new_v4(), "approve_investment", Uuid::new_v4());
        assert_eq!(entry.status, AuditStatus::Success);
        assert_eq!(entry.severity, AuditSeverity::Info);
        assert!(entry.before.is_none() && entry.after.is_none() && entry.transaction_id.is_none());
    }

    #[test]
    fn builder_methods_compose_onto_a_fresh_entry() {
        let tx_id = TransactionId::new_v7();
        let entry = AuditEntry::success("fund_disbursement", Uuid::new_v4(), "reject_disbursement", Uuid::new_v4())
            .with_reason("milestone not verified")
            .with_status(AuditStatus::Failed, AuditSeverity::Error)
            .with_transaction(tx_id);

        assert_eq!(entry.status, AuditStatus::Failed);
        assert_eq!(entry.severity, AuditSeverity::Error);
        assert_eq!(entry.reason.as_deref(), Some("milestone not verified"));
        assert_eq!(entry.transaction_id, Some(tx_id));
    }
}
