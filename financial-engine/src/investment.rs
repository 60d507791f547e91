//! Investment lifecycle: create, approve, reject, cancel (spec §4.4 step 1).
//!
//! Per the co-location rule (spec §4.1), an investment is routed by its
//! **project's** identifier, not its own — this is what keeps create/approve/
//! reject/cancel single-shard against the project in the common case. Every
//! mutating request therefore carries the project id alongside the
//! investment id (the same way a real transport would nest these paths,
//! `/projects/{project_id}/investments/{investment_id}`), and the SQL for an
//! existing investment filters on both so a mismatched pair surfaces as
//! `NotFound` instead of silently reading the wrong project's shard. Only the
//! escrow account sits on a different shard (it is routed by cooperative id),
//! which is why approval and a funded cancellation still go through the
//! coordinator rather than a plain single-shard `exec_on`.
//!
//! A closure handed to `Coordinator::execute` must resolve to
//! `tx_coordinator::Result<T>`, not this crate's own `Result<T>` — so every
//! error raised *inside* one of these closures is built as a
//! `tx_coordinator::Error` (aliased `TxError` below) and only converted to
//! this crate's `Error` by the `?` at the closure's call site.

use crate::engine::{tx_error_from_audit, FinancialEngine, IdempotentOutcome};
use crate::error::{Error, Result};
use crate::rows::{self, escrow_snapshot, project_snapshot};
use chrono::Utc;
use ledger_model::{
    Investment, InvestmentId, InvestmentStatus, InvestmentType, Money, ProjectId, ProjectStatus, Row, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tx_coordinator::{Error as TxError, TxHandle};

/// Project columns every module routed by `project_id` needs: shared via
/// [`rows::project_snapshot`] so `disbursement`, `profit`, and `refund` read
/// the same row shape this module does.
pub(crate) const SELECT_PROJECT_FOR_UPDATE: &str = "SELECT id, cooperative_id, owner_id, currency, funding_goal, \
     current_funding, min_funding_required, funding_deadline, status, \
     investment_limit_min, investment_limit_max, created_at, updated_at \
     FROM projects WHERE id = $1 FOR UPDATE";

pub(crate) const SELECT_ESCROW_FOR_COOPERATIVE: &str = "SELECT id, cooperative_id, balance, balance_currency, \
     total_invested_in, total_invested_in_currency, total_distributed_out, \
     total_distributed_out_currency, status, created_at, updated_at \
     FROM escrow_accounts WHERE cooperative_id = $1 FOR UPDATE";

pub(crate) const SELECT_ESCROW_FOR_UPDATE: &str = "SELECT id, cooperative_id, balance, balance_currency, \
     total_invested_in, total_invested_in_currency, total_distributed_out, \
     total_distributed_out_currency, status, created_at, updated_at \
     FROM escrow_accounts WHERE id = $1 FOR UPDATE";

const SELECT_INVESTMENT_FOR_UPDATE: &str = "SELECT id, investor_id, project_id, escrow_account_id, amount, \
     currency, investment_type, status, approved_by, approved_at, rejection_reason, \
     transfer_reference, created_at, updated_at FROM investments WHERE id = $1 AND project_id = $2 FOR UPDATE";

const SELECT_INVESTOR_COMMITTED_TOTAL: &str = "SELECT COALESCE(SUM(amount), 0) AS total FROM investments \
     WHERE project_id = $1 AND investor_id = $2 AND status IN ('approved', 'active')";

const INSERT_INVESTMENT_SQL: &str = "INSERT INTO investments \
     (id, investor_id, project_id, escrow_account_id, amount, currency, investment_type, \
      status, created_at, updated_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)";

const UPDATE_INVESTMENT_APPROVAL_SQL: &str = "UPDATE investments SET status = $1, approved_by = $2, \
     approved_at = $3, transfer_reference = $4, updated_at = $3 WHERE id = $5";

const UPDATE_INVESTMENT_REJECTION_SQL: &str = "UPDATE investments SET status = 'rejected', \
     rejection_reason = $1, updated_at = $2 WHERE id = $3";

const UPDATE_INVESTMENT_CANCELLATION_SQL: &str = "UPDATE investments SET status = 'cancelled', \
     updated_at = $1 WHERE id = $2";

const UPDATE_PROJECT_FUNDING_SQL: &str = "UPDATE projects SET current_funding = $1, updated_at = $2 WHERE id = $3";

const UPDATE_ESCROW_BALANCE_CREDIT_SQL: &str = "UPDATE escrow_accounts SET balance = $1, total_invested_in = $2, \
     updated_at = $3 WHERE id = $4";

const UPDATE_ESCROW_BALANCE_DEBIT_SQL: &str = "UPDATE escrow_accounts SET balance = $1, \
     total_distributed_out = $2, updated_at = $3 WHERE id = $4";

/// Request to create a new investment, pending cooperative approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvestmentRequest {
    /// The investing user.
    pub investor_id: UserId,
    /// The project being invested in.
    pub project_id: ProjectId,
    /// Amount to invest (currency is taken from the project).
    pub amount: Decimal,
    /// Full or partial.
    pub investment_type: InvestmentType,
}

/// Request to approve a pending investment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveInvestmentRequest {
    /// The project the investment was made against (its routing key).
    pub project_id: ProjectId,
    /// The investment to approve.
    pub investment_id: InvestmentId,
    /// The cooperative admin approving it.
    pub approved_by: UserId,
}

/// Request to reject a pending investment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectInvestmentRequest {
    /// The project the investment was made against (its routing key).
    pub project_id: ProjectId,
    /// The investment to reject.
    pub investment_id: InvestmentId,
    /// The cooperative admin rejecting it.
    pub rejected_by: UserId,
    /// Required reason for the rejection.
    pub reason: String,
}

/// Request to cancel an investment before it is folded into a distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelInvestmentRequest {
    /// The project the investment was made against (its routing key).
    pub project_id: ProjectId,
    /// The investment to cancel.
    pub investment_id: InvestmentId,
    /// Who requested the cancellation (the investor, or a cooperative admin).
    pub cancelled_by: UserId,
}

/// Response wrapping the investment row after a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentResponse {
    /// The investment in its post-operation state.
    pub investment: Investment,
}

fn investment_from_row(row: &Row) -> Result<Investment> {
    let status_str: String = rows::required(row, "investment", "status")?;
    Ok(Investment {
        id: rows::id_col(row, "investment", "id")?,
        investor_id: rows::id_col(row, "investment", "investor_id")?,
        project_id: rows::id_col(row, "investment", "project_id")?,
        escrow_account_id: rows::id_col(row, "investment", "escrow_account_id")?,
        amount: rows::money(row, "investment", "amount", "currency")?,
        investment_type: parse_investment_type(&rows::required::<String>(row, "investment", "investment_type")?)?,
        status: parse_investment_status(&status_str)?,
        approved_by: rows::opt_id_col(row, "approved_by"),
        approved_at: row.get("approved_at"),
        rejection_reason: row.get("rejection_reason"),
        transfer_reference: row.get("transfer_reference"),
        created_at: rows::timestamp(row, "investment", "created_at")?,
        updated_at: rows::timestamp(row, "investment", "updated_at")?,
    })
}

fn parse_investment_type(s: &str) -> Result<InvestmentType> {
    match s {
        "full" => Ok(InvestmentType::Full),
        "partial" => Ok(InvestmentType::Partial),
        other => Err(Error::Core(ledger_model::Error::BadKey(format!("unknown investment_type {other}")))),
    }
}

fn parse_investment_status(s: &str) -> Result<InvestmentStatus> {
    Ok(match s {
        "pending" => InvestmentStatus::Pending,
        "approved" => InvestmentStatus::Approved,
        "active" => InvestmentStatus::Active,
        "completed" => InvestmentStatus::Completed,
        "rejected" => InvestmentStatus::Rejected,
        "cancelled" => InvestmentStatus::Cancelled,
        "refunded" => InvestmentStatus::Refunded,
        other => return Err(Error::Core(ledger_model::Error::BadKey(format!("unknown investment status {other}")))),
    })
}

fn investment_type_label(t: InvestmentType) -> &'static str {
    match t {
        InvestmentType::Full => "full",
        InvestmentType::Partial => "partial",
    }
}

fn investment_status_label(s: InvestmentStatus) -> &'static str {
    match s {
        InvestmentStatus::Pending => "pending",
        InvestmentStatus::Approved => "approved",
        InvestmentStatus::Active => "active",
        InvestmentStatus::Completed => "completed",
        InvestmentStatus::Rejected => "rejected",
        InvestmentStatus::Cancelled => "cancelled",
        InvestmentStatus::Refunded => "refunded",
    }
}

fn tx_not_found(entity: &str, id: impl std::fmt::Display) -> TxError {
    TxError::Core(ledger_model::Error::NotFound(format!("{entity} {id}")))
}

impl FinancialEngine {
    /// Create a new investment, `Pending` cooperative approval (spec §4.4
    /// step 1). Validates amount bounds (cooperative-wide and per-project),
    /// the project's funding ceiling, and the investor's concentration
    /// limit before writing anything.
    pub async fn create_investment(
        &self,
        idempotency_key: Option<&str>,
        req: CreateInvestmentRequest,
    ) -> Result<IdempotentOutcome<InvestmentResponse>> {
        self.run_idempotent(req.investor_id, "create_investment", idempotency_key, &req, || async {
            self.create_investment_inner(&req).await
        })
        .await
    }

    async fn create_investment_inner(&self, req: &CreateInvestmentRequest) -> Result<InvestmentResponse> {
        if req.amount <= Decimal::ZERO {
            return Err(Error::Core(ledger_model::Error::AmountOutOfRange(format!(
                "investment amount {} must be positive",
                req.amount
            ))));
        }
        let policy = self.config.cooperative_policy;
        if req.amount < policy.min_investment || req.amount > policy.max_investment {
            return Err(Error::Core(ledger_model::Error::LimitExceeded(format!(
                "amount {} falls outside the cooperative's {}..{} investment bounds",
                req.amount, policy.min_investment, policy.max_investment
            ))));
        }

        let investment_id = InvestmentId::new_v7();
        let project_shard = self.router.route(req.project_id.as_bytes());
        let ctx = self.coordinator.context();

        let project_id = req.project_id;
        let amount = req.amount;
        let investor_id = req.investor_id;
        let investment_type = req.investment_type;

        let investment = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let project_rows = tx
                        .query_on(project_shard, SELECT_PROJECT_FOR_UPDATE, &[project_id.as_uuid().into()])
                        .await?;
                    let project_row = project_rows.first().ok_or_else(|| tx_not_found("project", project_id))?;
                    let project = project_snapshot(project_row)?;

                    if !matches!(project.status, ProjectStatus::Approved | ProjectStatus::Active) {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "project {project_id} is not open for investment (status {:?})",
                            project.status
                        ))));
                    }

                    if let Some(min) = project.limit_min {
                        if amount < min {
                            return Err(TxError::Core(ledger_model::Error::AmountOutOfRange(format!(
                                "amount {amount} is below the project's minimum of {min}"
                            ))));
                        }
                    }
                    if let Some(max) = project.limit_max {
                        if amount > max {
                            return Err(TxError::Core(ledger_model::Error::AmountOutOfRange(format!(
                                "amount {amount} exceeds the project's maximum of {max}"
                            ))));
                        }
                    }

                    let remaining = project.funding_goal - project.current_funding;
                    if amount > remaining {
                        return Err(TxError::Core(ledger_model::Error::FundingGoalExceeded(format!(
                            "amount {amount} would exceed the project's funding goal; {remaining} remains"
                        ))));
                    }

                    if policy.max_investor_concentration_bps > 0 {
                        let committed_rows = tx
                            .query_on(
                                project_shard,
                                SELECT_INVESTOR_COMMITTED_TOTAL,
                                &[project_id.as_uuid().into(), investor_id.as_uuid().into()],
                            )
                            .await?;
                        let committed: Decimal = committed_rows
                            .first()
                            .and_then(|r| r.get::<Decimal>("total"))
                            .unwrap_or(Decimal::ZERO);
                        let projected = committed + amount;
                        let cap = ledger_model::money::round_currency(
                            project.funding_goal * Decimal::from(policy.max_investor_concentration_bps)
                                / Decimal::from(ledger_model::BASIS_POINTS_WHOLE),
                        );
                        if projected > cap {
                            return Err(TxError::Core(ledger_model::Error::LimitExceeded(format!(
                                "investor concentration {projected} would exceed {cap} ({}bps of the goal)",
                                policy.max_investor_concentration_bps
                            ))));
                        }
                    }

                    let escrow_rows = tx
                        .query_on(project_shard, SELECT_ESCROW_FOR_COOPERATIVE, &[project.cooperative_id.as_uuid().into()])
                        .await?;
                    let escrow_row = escrow_rows
                        .first()
                        .ok_or_else(|| tx_not_found("escrow_account for cooperative", project.cooperative_id))?;
                    let escrow = escrow_snapshot(escrow_row)?;

                    let now = Utc::now();
                    tx.exec_on(
                        project_shard,
                        INSERT_INVESTMENT_SQL,
                        &[
                            investment_id.as_uuid().into(),
                            investor_id.as_uuid().into(),
                            project_id.as_uuid().into(),
                            escrow.id.as_uuid().into(),
                            amount.into(),
                            project.currency.code().into(),
                            investment_type_label(investment_type).into(),
                            investment_status_label(InvestmentStatus::Pending).into(),
                            now.into(),
                        ],
                    )
                    .await?;

                    let investment = Investment {
                        id: investment_id,
                        investor_id,
                        project_id,
                        escrow_account_id: escrow.id,
                        amount: Money::new(amount, project.currency),
                        investment_type,
                        status: InvestmentStatus::Pending,
                        approved_by: None,
                        approved_at: None,
                        rejection_reason: None,
                        transfer_reference: None,
                        created_at: now,
                        updated_at: now,
                    };

                    let entry = audit_log::AuditEntry::success(
                        "investment",
                        investment_id.as_uuid(),
                        "create_investment",
                        investor_id.as_uuid(),
                    )
                    .with_snapshot(None, serde_json::to_value(&investment).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(investment)
                })
            })
            .await?;

        Ok(InvestmentResponse { investment })
    }

    /// Approve a pending investment: credit the cooperative's escrow
    /// account, increment the project's `current_funding`, and mint a
    /// transfer reference (spec §4.4 step 1, §3).
    pub async fn approve_investment(
        &self,
        idempotency_key: Option<&str>,
        req: ApproveInvestmentRequest,
    ) -> Result<IdempotentOutcome<InvestmentResponse>> {
        self.run_idempotent(req.approved_by, "approve_investment", idempotency_key, &req, || async {
            self.approve_investment_inner(&req).await
        })
        .await
    }

    async fn approve_investment_inner(&self, req: &ApproveInvestmentRequest) -> Result<InvestmentResponse> {
        let project_id = req.project_id;
        let investment_id = req.investment_id;
        let approved_by = req.approved_by;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let investment = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let investment_rows = tx
                        .query_on(
                            project_shard,
                            SELECT_INVESTMENT_FOR_UPDATE,
                            &[investment_id.as_uuid().into(), project_id.as_uuid().into()],
                        )
                        .await?;
                    let investment_row = investment_rows.first().ok_or_else(|| tx_not_found("investment", investment_id))?;
                    let before = investment_from_row(investment_row).map_err(to_tx_error)?;

                    if before.status != InvestmentStatus::Pending {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "investment {investment_id} is {:?}, not pending",
                            before.status
                        ))));
                    }

                    let project_rows = tx
                        .query_on(project_shard, SELECT_PROJECT_FOR_UPDATE, &[project_id.as_uuid().into()])
                        .await?;
                    let project_row = project_rows
                        .first()
                        .ok_or_else(|| tx_not_found("project", project_id))?;
                    let project = project_snapshot(project_row)?;

                    let escrow_shard = self.router.route(before.escrow_account_id.as_bytes());
                    let escrow_rows = tx
                        .query_on(escrow_shard, SELECT_ESCROW_FOR_UPDATE, &[before.escrow_account_id.as_uuid().into()])
                        .await?;
                    let escrow_row = escrow_rows
                        .first()
                        .ok_or_else(|| tx_not_found("escrow_account", before.escrow_account_id))?;
                    let escrow = escrow_snapshot(escrow_row)?;

                    let now = Utc::now();
                    let new_status = if project.status == ProjectStatus::Active {
                        InvestmentStatus::Active
                    } else {
                        InvestmentStatus::Approved
                    };
                    let transfer_reference = self.generate_transfer_reference();

                    tx.exec_on(
                        project_shard,
                        UPDATE_INVESTMENT_APPROVAL_SQL,
                        &[
                            investment_status_label(new_status).into(),
                            approved_by.as_uuid().into(),
                            now.into(),
                            transfer_reference.clone().into(),
                            investment_id.as_uuid().into(),
                        ],
                    )
                    .await?;

                    let new_balance = escrow.balance + before.amount.amount();
                    let new_total_invested_in = escrow.total_invested_in + before.amount.amount();
                    tx.exec_on(
                        escrow_shard,
                        UPDATE_ESCROW_BALANCE_CREDIT_SQL,
                        &[
                            new_balance.into(),
                            new_total_invested_in.into(),
                            now.into(),
                            escrow.id.as_uuid().into(),
                        ],
                    )
                    .await?;

                    let new_current_funding = project.current_funding + before.amount.amount();
                    tx.exec_on(
                        project_shard,
                        UPDATE_PROJECT_FUNDING_SQL,
                        &[new_current_funding.into(), now.into(), project.id.as_uuid().into()],
                    )
                    .await?;

                    let after = Investment {
                        status: new_status,
                        approved_by: Some(approved_by),
                        approved_at: Some(now),
                        transfer_reference: Some(transfer_reference),
                        updated_at: now,
                        ..before.clone()
                    };

                    let entry = audit_log::AuditEntry::success(
                        "investment",
                        investment_id.as_uuid(),
                        "approve_investment",
                        approved_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(after)
                })
            })
            .await?;

        Ok(InvestmentResponse { investment })
    }

    /// Reject a pending investment; no funds have moved, so this is a
    /// single-shard write plus its audit entry.
    pub async fn reject_investment(
        &self,
        idempotency_key: Option<&str>,
        req: RejectInvestmentRequest,
    ) -> Result<IdempotentOutcome<InvestmentResponse>> {
        self.run_idempotent(req.rejected_by, "reject_investment", idempotency_key, &req, || async {
            self.reject_investment_inner(&req).await
        })
        .await
    }

    async fn reject_investment_inner(&self, req: &RejectInvestmentRequest) -> Result<InvestmentResponse> {
        if req.reason.trim().is_empty() {
            return Err(Error::Core(ledger_model::Error::PolicyViolation(
                "a rejection requires a non-empty reason".to_string(),
            )));
        }
        let project_id = req.project_id;
        let investment_id = req.investment_id;
        let reason = req.reason.clone();
        let rejected_by = req.rejected_by;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let investment = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let investment_rows = tx
                        .query_on(
                            project_shard,
                            SELECT_INVESTMENT_FOR_UPDATE,
                            &[investment_id.as_uuid().into(), project_id.as_uuid().into()],
                        )
                        .await?;
                    let investment_row = investment_rows.first().ok_or_else(|| tx_not_found("investment", investment_id))?;
                    let before = investment_from_row(investment_row).map_err(to_tx_error)?;

                    if before.status != InvestmentStatus::Pending {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "investment {investment_id} is {:?}, not pending",
                            before.status
                        ))));
                    }

                    let now = Utc::now();
                    tx.exec_on(
                        project_shard,
                        UPDATE_INVESTMENT_REJECTION_SQL,
                        &[reason.clone().into(), now.into(), investment_id.as_uuid().into()],
                    )
                    .await?;

                    let after = Investment {
                        status: InvestmentStatus::Rejected,
                        rejection_reason: Some(reason.clone()),
                        updated_at: now,
                        ..before.clone()
                    };

                    let entry = audit_log::AuditEntry::success(
                        "investment",
                        investment_id.as_uuid(),
                        "reject_investment",
                        rejected_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok())
                    .with_reason(reason);
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(after)
                })
            })
            .await?;

        Ok(InvestmentResponse { investment })
    }

    /// Cancel an investment before it has been swept into a distribution.
    /// If it had already been approved (escrow credited, project funding
    /// incremented), both are reversed in the same transaction.
    pub async fn cancel_investment(
        &self,
        idempotency_key: Option<&str>,
        req: CancelInvestmentRequest,
    ) -> Result<IdempotentOutcome<InvestmentResponse>> {
        self.run_idempotent(req.cancelled_by, "cancel_investment", idempotency_key, &req, || async {
            self.cancel_investment_inner(&req).await
        })
        .await
    }

    async fn cancel_investment_inner(&self, req: &CancelInvestmentRequest) -> Result<InvestmentResponse> {
        let project_id = req.project_id;
        let investment_id = req.investment_id;
        let cancelled_by = req.cancelled_by;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let investment = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let investment_rows = tx
                        .query_on(
                            project_shard,
                            SELECT_INVESTMENT_FOR_UPDATE,
                            &[investment_id.as_uuid().into(), project_id.as_uuid().into()],
                        )
                        .await?;
                    let investment_row = investment_rows.first().ok_or_else(|| tx_not_found("investment", investment_id))?;
                    let before = investment_from_row(investment_row).map_err(to_tx_error)?;

                    if matches!(
                        before.status,
                        InvestmentStatus::Completed
                            | InvestmentStatus::Rejected
                            | InvestmentStatus::Cancelled
                            | InvestmentStatus::Refunded
                    ) {
                        return Err(TxError::Core(ledger_model::Error::AlreadyFinalized(format!(
                            "investment {investment_id} is already {:?}",
                            before.status
                        ))));
                    }

                    let now = Utc::now();
                    let was_funded = matches!(before.status, InvestmentStatus::Approved | InvestmentStatus::Active);

                    if was_funded {
                        let escrow_shard = self.router.route(before.escrow_account_id.as_bytes());
                        let escrow_rows = tx
                            .query_on(escrow_shard, SELECT_ESCROW_FOR_UPDATE, &[before.escrow_account_id.as_uuid().into()])
                            .await?;
                        let escrow_row = escrow_rows
                            .first()
                            .ok_or_else(|| tx_not_found("escrow_account", before.escrow_account_id))?;
                        let escrow = escrow_snapshot(escrow_row)?;

                        if escrow.balance < before.amount.amount() {
                            return Err(TxError::Core(ledger_model::Error::InsufficientEscrow(format!(
                                "escrow {} holds {} but investment {investment_id} needs {} reversed",
                                escrow.id, escrow.balance, before.amount.amount()
                            ))));
                        }

                        let new_balance = escrow.balance - before.amount.amount();
                        tx.exec_on(
                            escrow_shard,
                            UPDATE_ESCROW_BALANCE_DEBIT_SQL,
                            &[
                                new_balance.into(),
                                escrow.total_distributed_out.into(),
                                now.into(),
                                escrow.id.as_uuid().into(),
                            ],
                        )
                        .await?;

                        let project_rows = tx
                            .query_on(project_shard, SELECT_PROJECT_FOR_UPDATE, &[project_id.as_uuid().into()])
                            .await?;
                        let project_row = project_rows
                            .first()
                            .ok_or_else(|| tx_not_found("project", project_id))?;
                        let project = project_snapshot(project_row)?;
                        let new_current_funding = project.current_funding - before.amount.amount();
                        tx.exec_on(
                            project_shard,
                            UPDATE_PROJECT_FUNDING_SQL,
                            &[new_current_funding.into(), now.into(), project.id.as_uuid().into()],
                        )
                        .await?;
                    }

                    tx.exec_on(project_shard, UPDATE_INVESTMENT_CANCELLATION_SQL, &[now.into(), investment_id.as_uuid().into()])
                        .await?;

                    let after = Investment {
                        status: InvestmentStatus::Cancelled,
                        updated_at: now,
                        ..before.clone()
                    };

                    let entry = audit_log::AuditEntry::success(
                        "investment",
                        investment_id.as_uuid(),
                        "cancel_investment",
                        cancelled_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(after)
                })
            })
            .await?;

        Ok(InvestmentResponse { investment })
    }
}

/// Fold this crate's `Error` (raised by `investment_from_row`, which is
/// shared with read paths outside any coordinator closure) back into a
/// `tx_coordinator::Error` for use inside one.
fn to_tx_error(e: Error) -> TxError {
    match e {
        Error::Core(core) => TxError::Core(core),
        Error::Router(router) => TxError::Router(router),
        Error::Coordinator(inner) => inner,
        other => TxError::Core(ledger_model::Error::Transient(other.to_string())),
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
        columns.insert("investor_id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("project_id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("escrow_account_id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("amount".into(), json!("5000.00"));
        columns.insert("currency".into(), json!("IDR"));
        columns.insert("investment_type".into(), json!("partial"));
        columns.insert("status".into(), json!("active"));
        columns.insert("approved_by".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("approved_at".into(), json!(Utc::now().to_rfc3339()));
        columns.insert("rejection_reason".into(), serde_json::Value::Null);
        columns.insert("transfer_reference".into(), json!("TXN-1700000000-deadbeef"));
        columns.insert("created_at".into(), json!(Utc::now().to_rfc3339()));
        columns.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));
        Row { columns }
    }

    #[test]
    fn investment_from_row_decodes_full_shape() {
        let investment = investment_from_row(&sample_row()).expect("row decodes");
        assert_eq!(investment.investment_type, InvestmentType::Partial);
        assert_eq!(investment.status, InvestmentStatus::Active);
        assert_eq!(investment.amount.amount(), Decimal::new(500000, 2));
        assert_eq!(investment.transfer_reference.as_deref(), Some("TXN-1700000000-deadbeef"));
        assert!(investment.approved_by.is_some());
    }

    #[test]
    fn investment_from_row_rejects_unknown_status() {
        let mut row = sample_row();
        row.columns.insert("status".into(), json!("frozen"));
        let err = investment_from_row(&row).unwrap_err();
        assert!(matches!(err, Error::Core(ledger_model::Error::BadKey(_))));
    }

    #[test]
    fn investment_from_row_rejects_unknown_investment_type() {
        let mut row = sample_row();
        row.columns.insert("investment_type".into(), json!("bridge"));
        let err = investment_from_row(&row).unwrap_err();
        assert!(matches!(err, Error::Core(ledger_model::Error::BadKey(_))));
    }

    #[test]
    fn investment_type_round_trips_through_its_label() {
        for t in [InvestmentType::Full, InvestmentType::Partial] {
            assert_eq!(parse_investment_type(investment_type_label(t)).unwrap(), t);
        }
    }

    #[test]
    fn investment_status_round_trips_through_its_label() {
        for s in [
            InvestmentStatus::Pending,
            InvestmentStatus::Approved,
            InvestmentStatus::Active,
            InvestmentStatus::Completed,
            InvestmentStatus::Rejected,
            InvestmentStatus::Cancelled,
            InvestmentStatus::Refunded,
        ] {
            assert_eq!(parse_investment_status(investment_status_label(s)).unwrap(), s);
        }
    }
}
