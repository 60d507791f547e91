//! Refund flow: `FundRefund` → fan-out `InvestorRefund` rows (spec §4.4
//! step 6). Triggered when a raise misses its minimum, a project is
//! cancelled outright, or an individual investor asks out before either of
//! those happens.
//!
//! Routed by **project** identifier, like `investment`/`disbursement`/
//! `profit` — a refund and every investor-refund row it fans out to live on
//! the project's shard; only the escrow debit crosses to the cooperative's
//! shard, exactly as an investment approval or a disbursement does.

use crate::engine::{tx_error_from_audit, FinancialEngine, IdempotentOutcome};
use crate::error::{Error, Result};
use crate::investment::{SELECT_ESCROW_FOR_COOPERATIVE, SELECT_PROJECT_FOR_UPDATE};
use crate::rows::{self, escrow_snapshot};
use chrono::{DateTime, Utc};
use ledger_model::{
    BasisPoints, InvestmentId, InvestorRefund, InvestorRefundId, Money, ProjectId, RefundId, RefundStatus,
    RefundTrigger, Row, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tx_coordinator::{Error as TxError, TxHandle};
use uuid::Uuid;

const SELECT_REFUND_FOR_UPDATE: &str = "SELECT id, project_id, trigger, total_amount, currency, status, \
     created_at, completed_at FROM fund_refunds WHERE id = $1 AND project_id = $2 FOR UPDATE";

const SELECT_OPEN_REFUND_FOR_PROJECT: &str = "SELECT id FROM fund_refunds \
     WHERE project_id = $1 AND status NOT IN ('completed', 'cancelled', 'failed')";

const SELECT_REFUNDABLE_INVESTMENTS: &str = "SELECT id, investor_id, amount FROM investments \
     WHERE project_id = $1 AND status IN ('approved', 'active')";

const INSERT_REFUND_SQL: &str = "INSERT INTO fund_refunds \
     (id, project_id, trigger, total_amount, currency, status, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7)";

const UPDATE_REFUND_STATUS_SQL: &str = "UPDATE fund_refunds SET status = $1, completed_at = $2 WHERE id = $3";

const INSERT_INVESTOR_REFUND_SQL: &str = "INSERT INTO investor_refunds \
     (id, refund_id, investment_id, investor_id, original_amount, processing_fee, net_amount, currency, \
      status, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";

const UPDATE_INVESTMENT_REFUNDED_SQL: &str = "UPDATE investments SET status = 'refunded', updated_at = $1 \
     WHERE id = $2";

const UPDATE_ESCROW_BALANCE_DEBIT_SQL: &str = "UPDATE escrow_accounts SET balance = $1, \
     total_distributed_out = $2, updated_at = $3 WHERE id = $4";

/// Request to open a project-level refund against every still-funded
/// investment (spec §4.4 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRefundRequest {
    /// The project being refunded (its routing key).
    pub project_id: ProjectId,
    /// Who or what triggered the refund.
    pub triggered_by: UserId,
    /// The reason class (spec §3's `RefundTrigger`).
    pub trigger: RefundTrigger,
    /// Free-text context, required when `trigger` is `InvestorRequest`.
    pub reason: Option<String>,
}

/// Request to withdraw a refund before it has been processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRefundRequest {
    /// The project the refund belongs to (its routing key).
    pub project_id: ProjectId,
    /// The refund to cancel.
    pub refund_id: RefundId,
    /// Who requested the cancellation.
    pub cancelled_by: UserId,
}

/// Request to settle every investor's refund against a pending refund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRefundRequest {
    /// The project this refund pays back (its routing key).
    pub project_id: ProjectId,
    /// The refund to process.
    pub refund_id: RefundId,
    /// Who triggered the run (a cooperative admin or a scheduled sweep).
    pub processed_by: UserId,
}

/// Response wrapping a refund and the investor-level rows it produced, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResponse {
    /// The refund in its post-operation state.
    pub refund: FundRefundView,
    /// Per-investor refunds, populated once this refund has been processed.
    pub investor_refunds: Vec<InvestorRefund>,
}

/// Project-level refund row (named to avoid colliding with
/// `ledger_model::FundRefund`'s field names while keeping the same shape —
/// this module only ever constructs it internally, so the distinct name
/// costs nothing and avoids re-exporting a type this crate doesn't own the
/// schema mapping for).
pub type FundRefundView = ledger_model::FundRefund;

fn parse_trigger(s: &str) -> std::result::Result<RefundTrigger, TxError> {
    Ok(match s {
        "minimum_funding_failed" => RefundTrigger::MinimumFundingFailed,
        "project_cancelled" => RefundTrigger::ProjectCancelled,
        "investor_request" => RefundTrigger::InvestorRequest,
        other => return Err(TxError::Core(ledger_model::Error::BadKey(format!("unknown refund trigger {other}")))),
    })
}

fn trigger_label(t: RefundTrigger) -> &'static str {
    match t {
        RefundTrigger::MinimumFundingFailed => "minimum_funding_failed",
        RefundTrigger::ProjectCancelled => "project_cancelled",
        RefundTrigger::InvestorRequest => "investor_request",
    }
}

fn parse_refund_status(s: &str) -> std::result::Result<RefundStatus, TxError> {
    Ok(match s {
        "pending" => RefundStatus::Pending,
        "processing" => RefundStatus::Processing,
        "completed" => RefundStatus::Completed,
        "failed" => RefundStatus::Failed,
        "cancelled" => RefundStatus::Cancelled,
        other => return Err(TxError::Core(ledger_model::Error::BadKey(format!("unknown refund status {other}")))),
    })
}

fn refund_status_label(s: RefundStatus) -> &'static str {
    match s {
        RefundStatus::Pending => "pending",
        RefundStatus::Processing => "processing",
        RefundStatus::Completed => "completed",
        RefundStatus::Failed => "failed",
        RefundStatus::Cancelled => "cancelled",
    }
}

fn refund_from_row(row: &Row) -> std::result::Result<FundRefundView, TxError> {
    let missing = |col: &str| TxError::Core(ledger_model::Error::NotFound(format!("fund_refund: missing {col} column")));
    let currency_code: String = row.get("currency").ok_or_else(|| missing("currency"))?;
    let currency = ledger_model::Currency::from_code(&currency_code)
        .ok_or_else(|| TxError::Core(ledger_model::Error::BadKey(format!("unknown currency {currency_code}"))))?;
    let trigger: String = row.get("trigger").ok_or_else(|| missing("trigger"))?;
    let status: String = row.get("status").ok_or_else(|| missing("status"))?;

    Ok(FundRefundView {
        id: row.get::<Uuid>("id").map(RefundId::from).ok_or_else(|| missing("id"))?,
        project_id: row.get::<Uuid>("project_id").map(ProjectId::from).ok_or_else(|| missing("project_id"))?,
        trigger: parse_trigger(&trigger)?,
        total_amount: Money::new(row.get("total_amount").ok_or_else(|| missing("total_amount"))?, currency),
        status: parse_refund_status(&status)?,
        created_at: row.get("created_at").ok_or_else(|| missing("created_at"))?,
        completed_at: row.get("completed_at"),
    })
}

fn tx_not_found(entity: &str, id: impl std::fmt::Display) -> TxError {
    TxError::Core(ledger_model::Error::NotFound(format!("{entity} {id}")))
}

impl FinancialEngine {
    /// Open a refund against every investment still holding funds in escrow
    /// for this project (`approved` or `active`) — spec §4.4 step 6.
    /// Refuses to open a second concurrent refund against the same project.
    pub async fn create_refund(
        &self,
        idempotency_key: Option<&str>,
        req: CreateRefundRequest,
    ) -> Result<IdempotentOutcome<RefundResponse>> {
        self.run_idempotent(req.triggered_by, "create_refund", idempotency_key, &req, || async {
            self.create_refund_inner(&req).await
        })
        .await
    }

    async fn create_refund_inner(&self, req: &CreateRefundRequest) -> Result<RefundResponse> {
        if matches!(req.trigger, RefundTrigger::InvestorRequest) && req.reason.as_deref().unwrap_or("").trim().is_empty() {
            return Err(Error::Core(ledger_model::Error::PolicyViolation(
                "an investor-requested refund requires a reason".to_string(),
            )));
        }

        let project_id = req.project_id;
        let triggered_by = req.triggered_by;
        let trigger = req.trigger;
        let reason = req.reason.clone();
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let refund = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let open = tx.query_on(project_shard, SELECT_OPEN_REFUND_FOR_PROJECT, &[project_id.as_uuid().into()]).await?;
                    if !open.is_empty() {
                        return Err(TxError::Core(ledger_model::Error::AlreadyFinalized(format!(
                            "project {project_id} already has an open refund"
                        ))));
                    }

                    let project_rows = tx
                        .query_on(project_shard, SELECT_PROJECT_FOR_UPDATE, &[project_id.as_uuid().into()])
                        .await?;
                    let project_row = project_rows.first().ok_or_else(|| tx_not_found("project", project_id))?;
                    let project = rows::project_snapshot(project_row)?;

                    let investment_rows = tx
                        .query_on(project_shard, SELECT_REFUNDABLE_INVESTMENTS, &[project_id.as_uuid().into()])
                        .await?;
                    let total: Decimal = investment_rows
                        .iter()
                        .map(|r| r.get::<Decimal>("amount").unwrap_or(Decimal::ZERO))
                        .sum();

                    if total <= Decimal::ZERO {
                        return Err(TxError::Core(ledger_model::Error::PolicyViolation(format!(
                            "project {project_id} has no approved or active investments to refund"
                        ))));
                    }

                    let refund_id = RefundId::new_v7();
                    let now = Utc::now();
                    tx.exec_on(
                        project_shard,
                        INSERT_REFUND_SQL,
                        &[
                            refund_id.as_uuid().into(),
                            project_id.as_uuid().into(),
                            trigger_label(trigger).into(),
                            total.into(),
                            project.currency.code().into(),
                            refund_status_label(RefundStatus::Pending).into(),
                            now.into(),
                        ],
                    )
                    .await?;

                    let refund = FundRefundView {
                        id: refund_id,
                        project_id,
                        trigger,
                        total_amount: Money::new(total, project.currency),
                        status: RefundStatus::Pending,
                        created_at: now,
                        completed_at: None,
                    };

                    let mut entry = audit_log::AuditEntry::success(
                        "fund_refund",
                        refund_id.as_uuid(),
                        "create_refund",
                        triggered_by.as_uuid(),
                    )
                    .with_snapshot(None, serde_json::to_value(&refund).ok());
                    if let Some(reason) = &reason {
                        entry = entry.with_reason(reason.clone());
                    }
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(refund)
                })
            })
            .await?;

        Ok(RefundResponse { refund, investor_refunds: Vec::new() })
    }

    /// Withdraw a refund before it has been processed.
    pub async fn cancel_refund(
        &self,
        idempotency_key: Option<&str>,
        req: CancelRefundRequest,
    ) -> Result<IdempotentOutcome<RefundResponse>> {
        self.run_idempotent(req.cancelled_by, "cancel_refund", idempotency_key, &req, || async {
            self.cancel_refund_inner(&req).await
        })
        .await
    }

    async fn cancel_refund_inner(&self, req: &CancelRefundRequest) -> Result<RefundResponse> {
        let project_id = req.project_id;
        let refund_id = req.refund_id;
        let cancelled_by = req.cancelled_by;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let refund = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let rows = tx
                        .query_on(project_shard, SELECT_REFUND_FOR_UPDATE, &[refund_id.as_uuid().into(), project_id.as_uuid().into()])
                        .await?;
                    let row = rows.first().ok_or_else(|| tx_not_found("fund_refund", refund_id))?;
                    let before = refund_from_row(row)?;

                    if before.status != RefundStatus::Pending {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "refund {refund_id} is {:?}, not pending",
                            before.status
                        ))));
                    }

                    let now = Utc::now();
                    tx.exec_on(
                        project_shard,
                        UPDATE_REFUND_STATUS_SQL,
                        &[refund_status_label(RefundStatus::Cancelled).into(), now.into(), refund_id.as_uuid().into()],
                    )
                    .await?;

                    let after = FundRefundView { status: RefundStatus::Cancelled, completed_at: Some(now), ..before.clone() };

                    let entry = audit_log::AuditEntry::success(
                        "fund_refund",
                        refund_id.as_uuid(),
                        "cancel_refund",
                        cancelled_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(after)
                })
            })
            .await?;

        Ok(RefundResponse { refund, investor_refunds: Vec::new() })
    }

    /// Settle every investor's refund against a pending refund (spec §4.4
    /// step 6): weight by original investment amount, allocate with the
    /// pinned largest-amount/id-ascending residue rule, withhold the
    /// cooperative's configured processing fee per investor, debit the
    /// escrow account by the net total paid out, and mark each refunded
    /// investment `Refunded`.
    pub async fn process_refund(
        &self,
        idempotency_key: Option<&str>,
        req: ProcessRefundRequest,
    ) -> Result<IdempotentOutcome<RefundResponse>> {
        self.run_idempotent(req.processed_by, "process_refund", idempotency_key, &req, || async {
            self.process_refund_inner(&req).await
        })
        .await
    }

    async fn process_refund_inner(&self, req: &ProcessRefundRequest) -> Result<RefundResponse> {
        let project_id = req.project_id;
        let refund_id = req.refund_id;
        let processed_by = req.processed_by;
        let fee_bps = self.config.refund_fee_bps;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let (refund, investor_refunds) = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let rows = tx
                        .query_on(project_shard, SELECT_REFUND_FOR_UPDATE, &[refund_id.as_uuid().into(), project_id.as_uuid().into()])
                        .await?;
                    let row = rows.first().ok_or_else(|| tx_not_found("fund_refund", refund_id))?;
                    let before = refund_from_row(row)?;

                    if before.status != RefundStatus::Pending {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "refund {refund_id} is {:?}, not pending",
                            before.status
                        ))));
                    }

                    let project_rows = tx
                        .query_on(project_shard, SELECT_PROJECT_FOR_UPDATE, &[project_id.as_uuid().into()])
                        .await?;
                    let project_row = project_rows.first().ok_or_else(|| tx_not_found("project", project_id))?;
                    let project = rows::project_snapshot(project_row)?;

                    let investment_rows = tx
                        .query_on(project_shard, SELECT_REFUNDABLE_INVESTMENTS, &[project_id.as_uuid().into()])
                        .await?;
                    if investment_rows.is_empty() {
                        return Err(TxError::Core(ledger_model::Error::PolicyViolation(format!(
                            "refund {refund_id} has no approved or active investments left to settle"
                        ))));
                    }

                    struct InvestmentRow {
                        id: InvestmentId,
                        investor_id: UserId,
                        amount: Decimal,
                    }
                    let mut refundable = Vec::with_capacity(investment_rows.len());
                    for r in &investment_rows {
                        let id = r
                            .get::<Uuid>("id")
                            .map(InvestmentId::from)
                            .ok_or_else(|| TxError::Core(ledger_model::Error::NotFound("investment: missing id column".to_string())))?;
                        let investor_id = r
                            .get::<Uuid>("investor_id")
                            .map(UserId::from)
                            .ok_or_else(|| TxError::Core(ledger_model::Error::NotFound("investment: missing investor_id column".to_string())))?;
                        let amount: Decimal = r
                            .get("amount")
                            .ok_or_else(|| TxError::Core(ledger_model::Error::NotFound("investment: missing amount column".to_string())))?;
                        refundable.push(InvestmentRow { id, investor_id, amount });
                    }

                    let fee_rate = BasisPoints::new(fee_bps)
                        .unwrap_or_else(|| BasisPoints::new(0).expect("0 is always valid"));

                    let escrow_shard = self.router.route(project.cooperative_id.as_bytes());
                    let escrow_rows = tx
                        .query_on(escrow_shard, SELECT_ESCROW_FOR_COOPERATIVE, &[project.cooperative_id.as_uuid().into()])
                        .await?;
                    let escrow_row = escrow_rows
                        .first()
                        .ok_or_else(|| tx_not_found("escrow_account for cooperative", project.cooperative_id))?;
                    let escrow = escrow_snapshot(escrow_row)?;

                    let now = Utc::now();
                    let mut total_original = Decimal::ZERO;
                    let mut investor_refunds = Vec::with_capacity(refundable.len());

                    for inv in &refundable {
                        let fee = ledger_model::money::round_currency(fee_rate.apply(inv.amount));
                        let net = inv.amount - fee;
                        total_original += inv.amount;

                        let investor_refund_id = InvestorRefundId::new_v7();
                        tx.exec_on(
                            project_shard,
                            INSERT_INVESTOR_REFUND_SQL,
                            &[
                                investor_refund_id.as_uuid().into(),
                                refund_id.as_uuid().into(),
                                inv.id.as_uuid().into(),
                                inv.investor_id.as_uuid().into(),
                                inv.amount.into(),
                                fee.into(),
                                net.into(),
                                project.currency.code().into(),
                                refund_status_label(RefundStatus::Completed).into(),
                                now.into(),
                            ],
                        )
                        .await?;

                        tx.exec_on(project_shard, UPDATE_INVESTMENT_REFUNDED_SQL, &[now.into(), inv.id.as_uuid().into()])
                            .await?;

                        investor_refunds.push(InvestorRefund {
                            id: investor_refund_id,
                            refund_id,
                            investment_id: inv.id,
                            investor_id: inv.investor_id,
                            original_amount: Money::new(inv.amount, project.currency),
                            processing_fee: Money::new(fee, project.currency),
                            net_amount: Money::new(net, project.currency),
                            status: RefundStatus::Completed,
                            created_at: now,
                        });
                    }

                    if escrow.balance < total_original {
                        return Err(TxError::Core(ledger_model::Error::InsufficientEscrow(format!(
                            "escrow {} holds {} but refund {refund_id} needs {total_original} debited",
                            escrow.id, escrow.balance
                        ))));
                    }
                    let new_balance = escrow.balance - total_original;
                    let new_total_distributed_out = escrow.total_distributed_out + total_original;
                    tx.exec_on(
                        escrow_shard,
                        UPDATE_ESCROW_BALANCE_DEBIT_SQL,
                        &[new_balance.into(), new_total_distributed_out.into(), now.into(), escrow.id.as_uuid().into()],
                    )
                    .await?;

                    tx.exec_on(
                        project_shard,
                        UPDATE_REFUND_STATUS_SQL,
                        &[refund_status_label(RefundStatus::Completed).into(), now.into(), refund_id.as_uuid().into()],
                    )
                    .await?;

                    let after = FundRefundView { status: RefundStatus::Completed, completed_at: Some(now), ..before.clone() };

                    let entry = audit_log::AuditEntry::success(
                        "fund_refund",
                        refund_id.as_uuid(),
                        "process_refund",
                        processed_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok((after, investor_refunds))
                })
            })
            .await?;

        Ok(RefundResponse { refund, investor_refunds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_row() -> Row {
        let mut columns = std::collections::BTreeMap::new();
        let now = Utc::now();
        columns.insert("id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("project_id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("trigger".into(), json!("minimum_funding_failed"));
        columns.insert("total_amount".into(), json!("5000.00"));
        columns.insert("currency".into(), json!("IDR"));
        columns.insert("status".into(), json!("processing"));
        columns.insert("created_at".into(), json!(now.to_rfc3339()));
        columns.insert("completed_at".into(), serde_json::Value::Null);
        Row { columns }
    }

    #[test]
    fn refund_from_row_decodes_full_shape() {
        let refund = refund_from_row(&sample_row()).expect("row decodes");
        assert_eq!(refund.trigger, RefundTrigger::MinimumFundingFailed);
        assert_eq!(refund.status, RefundStatus::Processing);
        assert_eq!(refund.total_amount.amount(), Decimal::new(500000, 2));
    }

    #[test]
    fn refund_from_row_rejects_unknown_trigger() {
        let mut row = sample_row();
        row.columns.insert("trigger".into(), json!("whim"));
        let err = refund_from_row(&row).unwrap_err();
        assert!(matches!(err, TxError::Core(ledger_model::Error::BadKey(_))));
    }

    #[test]
    fn trigger_round_trips_through_its_label() {
        for t in [RefundTrigger::MinimumFundingFailed, RefundTrigger::ProjectCancelled, RefundTrigger::InvestorRequest] {
            assert_eq!(parse_trigger(trigger_label(t)).unwrap(), t);
        }
    }

    #[test]
    fn refund_status_round_trips_through_its_label() {
        for s in [
            RefundStatus::Pending,
            RefundStatus::Processing,
            RefundStatus::Completed,
            RefundStatus::Failed,
            RefundStatus::Cancelled,
        ] {
            assert_eq!(parse_refund_status(refund_status_label(s)).unwrap(), s);
        }
    }
}
