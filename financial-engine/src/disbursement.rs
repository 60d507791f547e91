//! Disbursement lifecycle: create, approve, reject, cancel, process (spec
//! §4.4 "Disbursement").
//!
//! Routed by the **project** identifier, same as `investment` — the
//! co-location rule (spec §4.1) keeps the whole release pipeline for one
//! project single-shard except for the escrow debit, which lives on the
//! cooperative's shard and so still goes through the coordinator.

use crate::engine::{tx_error_from_audit, FinancialEngine, IdempotentOutcome};
use crate::error::{Error, Result};
use crate::investment::{SELECT_ESCROW_FOR_COOPERATIVE, SELECT_PROJECT_FOR_UPDATE};
use crate::rows::{self, escrow_snapshot, project_snapshot};
use chrono::Utc;
use ledger_model::{
    DisbursementId, DisbursementStatus, DisbursementType, FundDisbursement, Money, ProjectId, Row, SqlValue, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tx_coordinator::{Error as TxError, TxHandle};

const SELECT_DISBURSEMENT_FOR_UPDATE: &str = "SELECT id, project_id, business_owner_id, milestone_id, amount, \
     currency, disbursement_type, status, bank_reference, approved_by, approved_at, created_at, updated_at \
     FROM fund_disbursements WHERE id = $1 AND project_id = $2 FOR UPDATE";

const SELECT_COMMITTED_DISBURSEMENTS: &str = "SELECT COALESCE(SUM(amount), 0) AS total FROM fund_disbursements \
     WHERE project_id = $1 AND status IN ('approved', 'disbursed') AND id <> $2";

const INSERT_DISBURSEMENT_SQL: &str = "INSERT INTO fund_disbursements \
     (id, project_id, business_owner_id, milestone_id, amount, currency, disbursement_type, \
      status, created_at, updated_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)";

const UPDATE_DISBURSEMENT_APPROVAL_SQL: &str = "UPDATE fund_disbursements SET status = $1, approved_by = $2, \
     approved_at = $3, updated_at = $3 WHERE id = $4";

const UPDATE_DISBURSEMENT_REJECTION_SQL: &str = "UPDATE fund_disbursements SET status = 'rejected', \
     updated_at = $1 WHERE id = $2";

const UPDATE_DISBURSEMENT_CANCELLATION_SQL: &str = "UPDATE fund_disbursements SET status = 'cancelled', \
     updated_at = $1 WHERE id = $2";

const UPDATE_DISBURSEMENT_PROCESSED_SQL: &str = "UPDATE fund_disbursements SET status = 'disbursed', \
     bank_reference = $1, updated_at = $2 WHERE id = $3";

const UPDATE_ESCROW_BALANCE_DEBIT_SQL: &str = "UPDATE escrow_accounts SET balance = $1, \
     total_distributed_out = $2, updated_at = $3 WHERE id = $4";

/// Request to create a new disbursement request against a project milestone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDisbursementRequest {
    /// The project the disbursement draws against (its routing key).
    pub project_id: ProjectId,
    /// The business owner requesting the release.
    pub business_owner_id: UserId,
    /// Milestone identifier, opaque to the engine.
    pub milestone_id: Option<String>,
    /// Amount requested.
    pub amount: Decimal,
    /// Milestone, partial, or final.
    pub disbursement_type: DisbursementType,
}

/// Request to approve a pending disbursement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveDisbursementRequest {
    /// The project the disbursement draws against (its routing key).
    pub project_id: ProjectId,
    /// The disbursement to approve.
    pub disbursement_id: DisbursementId,
    /// The cooperative admin approving it.
    pub approved_by: UserId,
}

/// Request to reject a pending disbursement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectDisbursementRequest {
    /// The project the disbursement draws against (its routing key).
    pub project_id: ProjectId,
    /// The disbursement to reject.
    pub disbursement_id: DisbursementId,
    /// The cooperative admin rejecting it.
    pub rejected_by: UserId,
    /// Required reason for the rejection.
    pub reason: String,
}

/// Request to withdraw a disbursement before it has been processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelDisbursementRequest {
    /// The project the disbursement draws against (its routing key).
    pub project_id: ProjectId,
    /// The disbursement to cancel.
    pub disbursement_id: DisbursementId,
    /// Who requested the cancellation.
    pub cancelled_by: UserId,
}

/// Request to release an approved disbursement's funds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDisbursementRequest {
    /// The project the disbursement draws against (its routing key).
    pub project_id: ProjectId,
    /// The disbursement to process.
    pub disbursement_id: DisbursementId,
    /// Who triggered the release (a cooperative admin or automated job).
    pub processed_by: UserId,
    /// Bank reference supplied by the payout rail, if already known.
    pub bank_reference: Option<String>,
}

/// Response wrapping the disbursement row after a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisbursementResponse {
    /// The disbursement in its post-operation state.
    pub disbursement: FundDisbursement,
}

fn disbursement_from_row(row: &Row) -> Result<FundDisbursement> {
    let status_str: String = rows::required(row, "disbursement", "status")?;
    let type_str: String = rows::required(row, "disbursement", "disbursement_type")?;
    Ok(FundDisbursement {
        id: rows::id_col(row, "disbursement", "id")?,
        project_id: rows::id_col(row, "disbursement", "project_id")?,
        business_owner_id: rows::id_col(row, "disbursement", "business_owner_id")?,
        milestone_id: row.get("milestone_id"),
        amount: rows::money(row, "disbursement", "amount", "currency")?,
        disbursement_type: parse_disbursement_type(&type_str)?,
        status: parse_disbursement_status(&status_str)?,
        bank_reference: row.get("bank_reference"),
        approved_by: rows::opt_id_col(row, "approved_by"),
        approved_at: row.get("approved_at"),
        created_at: rows::timestamp(row, "disbursement", "created_at")?,
        updated_at: rows::timestamp(row, "disbursement", "updated_at")?,
    })
}

fn parse_disbursement_type(s: &str) -> Result<DisbursementType> {
    Ok(match s {
        "milestone" => DisbursementType::Milestone,
        "partial" => DisbursementType::Partial,
        "final" => DisbursementType::Final,
        other => return Err(Error::Core(ledger_model::Error::BadKey(format!("unknown disbursement_type {other}")))),
    })
}

fn parse_disbursement_status(s: &str) -> Result<DisbursementStatus> {
    Ok(match s {
        "pending" => DisbursementStatus::Pending,
        "approved" => DisbursementStatus::Approved,
        "disbursed" => DisbursementStatus::Disbursed,
        "rejected" => DisbursementStatus::Rejected,
        "cancelled" => DisbursementStatus::Cancelled,
        other => return Err(Error::Core(ledger_model::Error::BadKey(format!("unknown disbursement status {other}")))),
    })
}

fn disbursement_type_label(t: DisbursementType) -> &'static str {
    match t {
        DisbursementType::Milestone => "milestone",
        DisbursementType::Partial => "partial",
        DisbursementType::Final => "final",
    }
}

fn disbursement_status_label(s: DisbursementStatus) -> &'static str {
    match s {
        DisbursementStatus::Pending => "pending",
        DisbursementStatus::Approved => "approved",
        DisbursementStatus::Disbursed => "disbursed",
        DisbursementStatus::Rejected => "rejected",
        DisbursementStatus::Cancelled => "cancelled",
    }
}

fn disbursement_from_row_tx(row: &Row) -> std::result::Result<FundDisbursement, TxError> {
    disbursement_from_row(row).map_err(to_tx_error)
}

fn to_tx_error(e: Error) -> TxError {
    match e {
        Error::Core(core) => TxError::Core(core),
        Error::Router(router) => TxError::Router(router),
        Error::Coordinator(inner) => inner,
        other => TxError::Core(ledger_model::Error::Transient(other.to_string())),
    }
}

fn tx_not_found(entity: &str, id: impl std::fmt::Display) -> TxError {
    TxError::Core(ledger_model::Error::NotFound(format!("{entity} {id}")))
}

impl FinancialEngine {
    /// Create a disbursement request against a project milestone (spec
    /// §4.4 "Create by project owner against a milestone"). No funds move;
    /// the request simply enters `Pending`.
    pub async fn create_disbursement(
        &self,
        idempotency_key: Option<&str>,
        req: CreateDisbursementRequest,
    ) -> Result<IdempotentOutcome<DisbursementResponse>> {
        self.run_idempotent(req.business_owner_id, "create_disbursement", idempotency_key, &req, || async {
            self.create_disbursement_inner(&req).await
        })
        .await
    }

    async fn create_disbursement_inner(&self, req: &CreateDisbursementRequest) -> Result<DisbursementResponse> {
        if req.amount <= Decimal::ZERO {
            return Err(Error::Core(ledger_model::Error::AmountOutOfRange(format!(
                "disbursement amount {} must be positive",
                req.amount
            ))));
        }

        let disbursement_id = DisbursementId::new_v7();
        let project_shard = self.router.route(req.project_id.as_bytes());
        let ctx = self.coordinator.context();

        let project_id = req.project_id;
        let amount = req.amount;
        let business_owner_id = req.business_owner_id;
        let milestone_id = req.milestone_id.clone();
        let disbursement_type = req.disbursement_type;

        let disbursement = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let project_rows = tx
                        .query_on(project_shard, SELECT_PROJECT_FOR_UPDATE, &[project_id.as_uuid().into()])
                        .await?;
                    let project_row = project_rows.first().ok_or_else(|| tx_not_found("project", project_id))?;
                    let project = project_snapshot(project_row)?;

                    let now = Utc::now();
                    tx.exec_on(
                        project_shard,
                        INSERT_DISBURSEMENT_SQL,
                        &[
                            disbursement_id.as_uuid().into(),
                            project_id.as_uuid().into(),
                            business_owner_id.as_uuid().into(),
                            milestone_id.clone().map(SqlValue::from).unwrap_or(SqlValue::Null),
                            amount.into(),
                            project.currency.code().into(),
                            disbursement_type_label(disbursement_type).into(),
                            disbursement_status_label(DisbursementStatus::Pending).into(),
                            now.into(),
                        ],
                    )
                    .await?;

                    let disbursement = FundDisbursement {
                        id: disbursement_id,
                        project_id,
                        business_owner_id,
                        milestone_id,
                        amount: Money::new(amount, project.currency),
                        disbursement_type,
                        status: DisbursementStatus::Pending,
                        bank_reference: None,
                        approved_by: None,
                        approved_at: None,
                        created_at: now,
                        updated_at: now,
                    };

                    let entry = audit_log::AuditEntry::success(
                        "disbursement",
                        disbursement_id.as_uuid(),
                        "create_disbursement",
                        business_owner_id.as_uuid(),
                    )
                    .with_snapshot(None, serde_json::to_value(&disbursement).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(disbursement)
                })
            })
            .await?;

        Ok(DisbursementResponse { disbursement })
    }

    /// Approve a pending disbursement, guarding that the running total of
    /// `Approved + Disbursed` amounts on this project never exceeds the
    /// escrow balance attributable to it (spec §4.4 "Disbursement.Approve").
    pub async fn approve_disbursement(
        &self,
        idempotency_key: Option<&str>,
        req: ApproveDisbursementRequest,
    ) -> Result<IdempotentOutcome<DisbursementResponse>> {
        self.run_idempotent(req.approved_by, "approve_disbursement", idempotency_key, &req, || async {
            self.approve_disbursement_inner(&req).await
        })
        .await
    }

    async fn approve_disbursement_inner(&self, req: &ApproveDisbursementRequest) -> Result<DisbursementResponse> {
        let project_id = req.project_id;
        let disbursement_id = req.disbursement_id;
        let approved_by = req.approved_by;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let disbursement = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let rows = tx
                        .query_on(
                            project_shard,
                            SELECT_DISBURSEMENT_FOR_UPDATE,
                            &[disbursement_id.as_uuid().into(), project_id.as_uuid().into()],
                        )
                        .await?;
                    let row = rows.first().ok_or_else(|| tx_not_found("disbursement", disbursement_id))?;
                    let before = disbursement_from_row_tx(row)?;

                    if before.status != DisbursementStatus::Pending {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "disbursement {disbursement_id} is {:?}, not pending",
                            before.status
                        ))));
                    }

                    let project_rows = tx
                        .query_on(project_shard, SELECT_PROJECT_FOR_UPDATE, &[project_id.as_uuid().into()])
                        .await?;
                    let project_row = project_rows.first().ok_or_else(|| tx_not_found("project", project_id))?;
                    let project = project_snapshot(project_row)?;

                    let committed_rows = tx
                        .query_on(
                            project_shard,
                            SELECT_COMMITTED_DISBURSEMENTS,
                            &[project_id.as_uuid().into(), disbursement_id.as_uuid().into()],
                        )
                        .await?;
                    let already_committed: Decimal = committed_rows
                        .first()
                        .and_then(|r| r.get::<Decimal>("total"))
                        .unwrap_or(Decimal::ZERO);

                    let attributable = project.current_funding;
                    let projected = already_committed + before.amount.amount();
                    if projected > attributable {
                        return Err(TxError::Core(ledger_model::Error::InsufficientEscrow(format!(
                            "project {project_id} has {attributable} attributable to it, \
                             approving {disbursement_id} would commit {projected}"
                        ))));
                    }

                    let now = Utc::now();
                    tx.exec_on(
                        project_shard,
                        UPDATE_DISBURSEMENT_APPROVAL_SQL,
                        &[
                            disbursement_status_label(DisbursementStatus::Approved).into(),
                            approved_by.as_uuid().into(),
                            now.into(),
                            disbursement_id.as_uuid().into(),
                        ],
                    )
                    .await?;

                    let after = FundDisbursement {
                        status: DisbursementStatus::Approved,
                        approved_by: Some(approved_by),
                        approved_at: Some(now),
                        updated_at: now,
                        ..before.clone()
                    };

                    let entry = audit_log::AuditEntry::success(
                        "disbursement",
                        disbursement_id.as_uuid(),
                        "approve_disbursement",
                        approved_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(after)
                })
            })
            .await?;

        Ok(DisbursementResponse { disbursement })
    }

    /// Reject a pending disbursement; no funds have moved.
    pub async fn reject_disbursement(
        &self,
        idempotency_key: Option<&str>,
        req: RejectDisbursementRequest,
    ) -> Result<IdempotentOutcome<DisbursementResponse>> {
        self.run_idempotent(req.rejected_by, "reject_disbursement", idempotency_key, &req, || async {
            self.reject_disbursement_inner(&req).await
        })
        .await
    }

    async fn reject_disbursement_inner(&self, req: &RejectDisbursementRequest) -> Result<DisbursementResponse> {
        if req.reason.trim().is_empty() {
            return Err(Error::Core(ledger_model::Error::PolicyViolation(
                "a rejection requires a non-empty reason".to_string(),
            )));
        }
        let project_id = req.project_id;
        let disbursement_id = req.disbursement_id;
        let rejected_by = req.rejected_by;
        let reason = req.reason.clone();
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let disbursement = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let rows = tx
                        .query_on(
                            project_shard,
                            SELECT_DISBURSEMENT_FOR_UPDATE,
                            &[disbursement_id.as_uuid().into(), project_id.as_uuid().into()],
                        )
                        .await?;
                    let row = rows.first().ok_or_else(|| tx_not_found("disbursement", disbursement_id))?;
                    let before = disbursement_from_row_tx(row)?;

                    if before.status != DisbursementStatus::Pending {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "disbursement {disbursement_id} is {:?}, not pending",
                            before.status
                        ))));
                    }

                    let now = Utc::now();
                    tx.exec_on(project_shard, UPDATE_DISBURSEMENT_REJECTION_SQL, &[now.into(), disbursement_id.as_uuid().into()])
                        .await?;

                    let after = FundDisbursement {
                        status: DisbursementStatus::Rejected,
                        updated_at: now,
                        ..before.clone()
                    };

                    let entry = audit_log::AuditEntry::success(
                        "disbursement",
                        disbursement_id.as_uuid(),
                        "reject_disbursement",
                        rejected_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok())
                    .with_reason(reason);
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(after)
                })
            })
            .await?;

        Ok(DisbursementResponse { disbursement })
    }

    /// Withdraw a disbursement before it has been processed. Legal from
    /// `Pending` or `Approved`; no escrow reversal is needed because
    /// approval alone never moves funds (only `process_disbursement` does).
    pub async fn cancel_disbursement(
        &self,
        idempotency_key: Option<&str>,
        req: CancelDisbursementRequest,
    ) -> Result<IdempotentOutcome<DisbursementResponse>> {
        self.run_idempotent(req.cancelled_by, "cancel_disbursement", idempotency_key, &req, || async {
            self.cancel_disbursement_inner(&req).await
        })
        .await
    }

    async fn cancel_disbursement_inner(&self, req: &CancelDisbursementRequest) -> Result<DisbursementResponse> {
        let project_id = req.project_id;
        let disbursement_id = req.disbursement_id;
        let cancelled_by = req.cancelled_by;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let disbursement = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let rows = tx
                        .query_on(
                            project_shard,
                            SELECT_DISBURSEMENT_FOR_UPDATE,
                            &[disbursement_id.as_uuid().into(), project_id.as_uuid().into()],
                        )
                        .await?;
                    let row = rows.first().ok_or_else(|| tx_not_found("disbursement", disbursement_id))?;
                    let before = disbursement_from_row_tx(row)?;

                    if !matches!(before.status, DisbursementStatus::Pending | DisbursementStatus::Approved) {
                        return Err(TxError::Core(ledger_model::Error::AlreadyFinalized(format!(
                            "disbursement {disbursement_id} is already {:?}",
                            before.status
                        ))));
                    }

                    let now = Utc::now();
                    tx.exec_on(project_shard, UPDATE_DISBURSEMENT_CANCELLATION_SQL, &[now.into(), disbursement_id.as_uuid().into()])
                        .await?;

                    let after = FundDisbursement {
                        status: DisbursementStatus::Cancelled,
                        updated_at: now,
                        ..before.clone()
                    };

                    let entry = audit_log::AuditEntry::success(
                        "disbursement",
                        disbursement_id.as_uuid(),
                        "cancel_disbursement",
                        cancelled_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(after)
                })
            })
            .await?;

        Ok(DisbursementResponse { disbursement })
    }

    /// Release an approved disbursement: debit the cooperative's escrow
    /// account and mark the row `Disbursed` with a bank reference (spec
    /// §4.4 "Process: atomically debit escrow ... and mark Disbursed").
    pub async fn process_disbursement(
        &self,
        idempotency_key: Option<&str>,
        req: ProcessDisbursementRequest,
    ) -> Result<IdempotentOutcome<DisbursementResponse>> {
        self.run_idempotent(req.processed_by, "process_disbursement", idempotency_key, &req, || async {
            self.process_disbursement_inner(&req).await
        })
        .await
    }

    async fn process_disbursement_inner(&self, req: &ProcessDisbursementRequest) -> Result<DisbursementResponse> {
        let project_id = req.project_id;
        let disbursement_id = req.disbursement_id;
        let processed_by = req.processed_by;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();
        let bank_reference = req
            .bank_reference
            .clone()
            .unwrap_or_else(|| self.generate_transfer_reference());

        let disbursement = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let rows = tx
                        .query_on(
                            project_shard,
                            SELECT_DISBURSEMENT_FOR_UPDATE,
                            &[disbursement_id.as_uuid().into(), project_id.as_uuid().into()],
                        )
                        .await?;
                    let row = rows.first().ok_or_else(|| tx_not_found("disbursement", disbursement_id))?;
                    let before = disbursement_from_row_tx(row)?;

                    if before.status != DisbursementStatus::Approved {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "disbursement {disbursement_id} is {:?}, not approved",
                            before.status
                        ))));
                    }

                    let project_rows = tx
                        .query_on(project_shard, SELECT_PROJECT_FOR_UPDATE, &[project_id.as_uuid().into()])
                        .await?;
                    let project_row = project_rows.first().ok_or_else(|| tx_not_found("project", project_id))?;
                    let project = project_snapshot(project_row)?;

                    let escrow_shard = self.router.route(project.cooperative_id.as_bytes());
                    let escrow_rows = tx
                        .query_on(escrow_shard, SELECT_ESCROW_FOR_COOPERATIVE, &[project.cooperative_id.as_uuid().into()])
                        .await?;
                    let escrow_row = escrow_rows
                        .first()
                        .ok_or_else(|| tx_not_found("escrow_account for cooperative", project.cooperative_id))?;
                    let escrow = escrow_snapshot(escrow_row)?;

                    if escrow.balance < before.amount.amount() {
                        return Err(TxError::Core(ledger_model::Error::InsufficientEscrow(format!(
                            "escrow {} holds {} but disbursement {disbursement_id} needs {}",
                            escrow.id, escrow.balance, before.amount.amount()
                        ))));
                    }

                    let now = Utc::now();
                    let new_balance = escrow.balance - before.amount.amount();
                    let new_distributed_out = escrow.total_distributed_out + before.amount.amount();
                    tx.exec_on(
                        escrow_shard,
                        UPDATE_ESCROW_BALANCE_DEBIT_SQL,
                        &[new_balance.into(), new_distributed_out.into(), now.into(), escrow.id.as_uuid().into()],
                    )
                    .await?;

                    tx.exec_on(
                        project_shard,
                        UPDATE_DISBURSEMENT_PROCESSED_SQL,
                        &[bank_reference.clone().into(), now.into(), disbursement_id.as_uuid().into()],
                    )
                    .await?;

                    let after = FundDisbursement {
                        status: DisbursementStatus::Disbursed,
                        bank_reference: Some(bank_reference.clone()),
                        updated_at: now,
                        ..before.clone()
                    };

                    let entry = audit_log::AuditEntry::success(
                        "disbursement",
                        disbursement_id.as_uuid(),
                        "process_disbursement",
                        processed_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(after)
                })
            })
            .await?;

        Ok(DisbursementResponse { disbursement })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn sample_row() -> Row {
        let mut columns = std::collections::BTreeMap::new();
        columns.insert("id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("project_id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("business_owner_id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("milestone_id".into(), json!("milestone-3"));
        columns.insert("amount".into(), json!("1200.50"));
        columns.insert("currency".into(), json!("IDR"));
        columns.insert("disbursement_type".into(), json!("milestone"));
        columns.insert("status".into(), json!("approved"));
        columns.insert("bank_reference".into(), serde_json::Value::Null);
        columns.insert("approved_by".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("approved_at".into(), json!(Utc::now().to_rfc3339()));
        columns.insert("created_at".into(), json!(Utc::now().to_rfc3339()));
        columns.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));
        Row { columns }
    }

    #[test]
    fn disbursement_from_row_decodes_full_shape() {
        let disbursement = disbursement_from_row(&sample_row()).expect("row decodes");
        assert_eq!(disbursement.disbursement_type, DisbursementType::Milestone);
        assert_eq!(disbursement.status, DisbursementStatus::Approved);
        assert_eq!(disbursement.amount.amount(), Decimal::new(120050, 2));
        assert_eq!(disbursement.milestone_id.as_deref(), Some("milestone-3"));
    }

    #[test]
    fn disbursement_from_row_rejects_unknown_type() {
        let mut row = sample_row();
        row.columns.insert("disbursement_type".into(), json!("bonus"));
        let err = disbursement_from_row(&row).unwrap_err();
        assert!(matches!(err, Error::Core(ledger_model::Error::BadKey(_))));
    }

    #[test]
    fn disbursement_type_round_trips_through_its_label() {
        for t in [DisbursementType::Milestone, DisbursementType::Partial, DisbursementType::Final] {
            assert_eq!(parse_disbursement_type(disbursement_type_label(t)).unwrap(), t);
        }
    }

    #[test]
    fn disbursement_status_round_trips_through_its_label() {
        for s in [
            DisbursementStatus::Pending,
            DisbursementStatus::Approved,
            DisbursementStatus::Disbursed,
            DisbursementStatus::Rejected,
            DisbursementStatus::Cancelled,
        ] {
            assert_eq!(parse_disbursement_status(disbursement_status_label(s)).unwrap(), s);
        }
    }
}
