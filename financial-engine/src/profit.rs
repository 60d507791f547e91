//! Profit-sharing pipeline: `ProfitCalculation` → `ProfitDistribution` →
//! `InvestorProfitShare` (spec §4.4 steps 4-5).
//!
//! Routed by **project** identifier like `investment` and `disbursement` —
//! a calculation, its distribution, and every share row it fans out to all
//! live on the project's shard; only the per-investor tax lookup and the
//! investment rows feeding the allocation are read from the same shard,
//! since investments are co-located with their project too.

use crate::engine::{tx_error_from_audit, FinancialEngine, IdempotentOutcome};
use crate::error::{Error, Result};
use crate::investment::SELECT_PROJECT_FOR_UPDATE;
use crate::rounding::{allocate_with_residue, Weighted};
use crate::rows;
use chrono::{DateTime, Utc};
use ledger_model::{
    BasisPoints, DistributionId, DistributionStatus, InvestmentId, InvestorProfitShare, InvestorShareId, Money,
    ProfitCalculation, ProfitCalculationId, ProfitDistribution, ProjectId, Row, ShareStatus, SharingRatio, UserId,
    VerificationStatus, BASIS_POINTS_WHOLE,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tx_coordinator::{Error as TxError, TxHandle};
use uuid::Uuid;

const SELECT_CALCULATION_FOR_UPDATE: &str = "SELECT id, project_id, period_start, period_end, revenue, expenses, \
     net, currency, sharing_investor_bps, sharing_business_bps, sharing_cooperative_bps, investor_share, \
     business_share, cooperative_share, verification_status, rejection_reason, created_at, updated_at \
     FROM profit_calculations WHERE id = $1 AND project_id = $2 FOR UPDATE";

const SELECT_DISTRIBUTION_FOR_CALCULATION: &str = "SELECT id FROM profit_distributions \
     WHERE profit_calculation_id = $1 AND status <> 'cancelled'";

const SELECT_DISTRIBUTION_FOR_UPDATE: &str = "SELECT id, project_id, profit_calculation_id, \
     total_distribution_amount, currency, status, created_at, completed_at \
     FROM profit_distributions WHERE id = $1 AND project_id = $2 FOR UPDATE";

const SELECT_PROJECT_INVESTMENTS: &str = "SELECT id, investor_id, amount FROM investments \
     WHERE project_id = $1 AND status IN ('active', 'completed')";

const SELECT_ACTIVE_TAX_DOCUMENTATION: &str = "SELECT rate_bps FROM tax_documentation \
     WHERE investor_id = $1 AND effective_from <= $2 AND (effective_to IS NULL OR effective_to >= $2) \
     ORDER BY effective_from DESC LIMIT 1";

const INSERT_CALCULATION_SQL: &str = "INSERT INTO profit_calculations \
     (id, project_id, period_start, period_end, revenue, expenses, net, currency, sharing_investor_bps, \
      sharing_business_bps, sharing_cooperative_bps, investor_share, business_share, cooperative_share, \
      verification_status, created_at, updated_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)";

const UPDATE_CALCULATION_VERIFICATION_SQL: &str = "UPDATE profit_calculations SET verification_status = $1, \
     rejection_reason = $2, updated_at = $3 WHERE id = $4";

const INSERT_DISTRIBUTION_SQL: &str = "INSERT INTO profit_distributions \
     (id, project_id, profit_calculation_id, total_distribution_amount, currency, status, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7)";

const UPDATE_DISTRIBUTION_STATUS_SQL: &str = "UPDATE profit_distributions SET status = $1, completed_at = $2 \
     WHERE id = $3";

const INSERT_SHARE_SQL: &str = "INSERT INTO investor_profit_shares \
     (id, distribution_id, investment_id, investor_id, original_investment_amount, \
      original_investment_currency, share_bps, gross, tax, net, currency, status, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)";

/// Request to record a period's revenue/expenses and the sharing ratio
/// applied to its net profit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProfitCalculationRequest {
    /// The project this period's P&L applies to (its routing key).
    pub project_id: ProjectId,
    /// Who is filing this calculation (a business owner).
    pub created_by: UserId,
    /// Period start (inclusive).
    pub period_start: DateTime<Utc>,
    /// Period end (inclusive).
    pub period_end: DateTime<Utc>,
    /// Reported revenue for the period.
    pub revenue: Decimal,
    /// Reported expenses for the period.
    pub expenses: Decimal,
    /// Sharing ratio applied to `revenue - expenses`; must sum to 10,000 bps.
    pub sharing_ratio: SharingRatio,
}

/// Request to review a pending profit calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyProfitCalculationRequest {
    /// The project the calculation was filed against (its routing key).
    pub project_id: ProjectId,
    /// The calculation to review.
    pub calculation_id: ProfitCalculationId,
    /// The cooperative admin reviewing it.
    pub verified_by: UserId,
    /// Accept (`true`) or reject (`false`) this calculation.
    pub approve: bool,
    /// Required when `approve` is `false`.
    pub rejection_reason: Option<String>,
}

/// Request to open a distribution against one verified calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDistributionRequest {
    /// The project this distribution pays out for (its routing key).
    pub project_id: ProjectId,
    /// The verified calculation this distribution is bound to.
    pub calculation_id: ProfitCalculationId,
    /// Who opened the distribution (a cooperative admin).
    pub created_by: UserId,
}

/// Request to withdraw a distribution before it has been processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelDistributionRequest {
    /// The project the distribution belongs to (its routing key).
    pub project_id: ProjectId,
    /// The distribution to cancel.
    pub distribution_id: DistributionId,
    /// Who requested the cancellation.
    pub cancelled_by: UserId,
}

/// Request to compute and settle every investor's share of a distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDistributionRequest {
    /// The project this distribution pays out for (its routing key).
    pub project_id: ProjectId,
    /// The distribution to process.
    pub distribution_id: DistributionId,
    /// Who triggered the run (a cooperative admin or a scheduled job).
    pub processed_by: UserId,
}

/// Response wrapping a profit calculation after a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitCalculationResponse {
    /// The calculation in its post-operation state.
    pub calculation: ProfitCalculation,
}

/// Response wrapping a distribution and the share rows it produced, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionResponse {
    /// The distribution in its post-operation state.
    pub distribution: ProfitDistribution,
    /// Per-investor shares, populated once the distribution has been
    /// processed (empty for a freshly created or cancelled distribution).
    pub shares: Vec<InvestorProfitShare>,
}

fn parse_verification_status(s: &str) -> std::result::Result<VerificationStatus, TxError> {
    Ok(match s {
        "pending" => VerificationStatus::Pending,
        "verified" => VerificationStatus::Verified,
        "rejected" => VerificationStatus::Rejected,
        other => return Err(TxError::Core(ledger_model::Error::BadKey(format!("unknown verification_status {other}")))),
    })
}

fn verification_status_label(s: VerificationStatus) -> &'static str {
    match s {
        VerificationStatus::Pending => "pending",
        VerificationStatus::Verified => "verified",
        VerificationStatus::Rejected => "rejected",
    }
}

fn parse_distribution_status(s: &str) -> std::result::Result<DistributionStatus, TxError> {
    Ok(match s {
        "pending" => DistributionStatus::Pending,
        "processing" => DistributionStatus::Processing,
        "completed" => DistributionStatus::Completed,
        "failed" => DistributionStatus::Failed,
        "cancelled" => DistributionStatus::Cancelled,
        other => return Err(TxError::Core(ledger_model::Error::BadKey(format!("unknown distribution status {other}")))),
    })
}

fn distribution_status_label(s: DistributionStatus) -> &'static str {
    match s {
        DistributionStatus::Pending => "pending",
        DistributionStatus::Processing => "processing",
        DistributionStatus::Completed => "completed",
        DistributionStatus::Failed => "failed",
        DistributionStatus::Cancelled => "cancelled",
    }
}

fn share_status_label(s: ShareStatus) -> &'static str {
    match s {
        ShareStatus::Pending => "pending",
        ShareStatus::Processed => "processed",
        ShareStatus::Completed => "completed",
        ShareStatus::Failed => "failed",
    }
}

fn calculation_from_row(row: &Row) -> std::result::Result<ProfitCalculation, TxError> {
    let missing = |col: &str| TxError::Core(ledger_model::Error::NotFound(format!("profit_calculation: missing {col} column")));
    let currency_code: String = row.get("currency").ok_or_else(|| missing("currency"))?;
    let currency = ledger_model::Currency::from_code(&currency_code)
        .ok_or_else(|| TxError::Core(ledger_model::Error::BadKey(format!("unknown currency {currency_code}"))))?;
    let status: String = row.get("verification_status").ok_or_else(|| missing("verification_status"))?;
    let investor_bps: u32 = row.get("sharing_investor_bps").ok_or_else(|| missing("sharing_investor_bps"))?;
    let business_bps: u32 = row.get("sharing_business_bps").ok_or_else(|| missing("sharing_business_bps"))?;
    let cooperative_bps: u32 = row.get("sharing_cooperative_bps").ok_or_else(|| missing("sharing_cooperative_bps"))?;

    Ok(ProfitCalculation {
        id: row.get::<Uuid>("id").map(ProfitCalculationId::from).ok_or_else(|| missing("id"))?,
        project_id: row.get::<Uuid>("project_id").map(ProjectId::from).ok_or_else(|| missing("project_id"))?,
        period_start: row.get("period_start").ok_or_else(|| missing("period_start"))?,
        period_end: row.get("period_end").ok_or_else(|| missing("period_end"))?,
        revenue: Money::new(row.get("revenue").ok_or_else(|| missing("revenue"))?, currency),
        expenses: Money::new(row.get("expenses").ok_or_else(|| missing("expenses"))?, currency),
        net: Money::new(row.get("net").ok_or_else(|| missing("net"))?, currency),
        sharing_ratio: SharingRatio { investor_bps, business_bps, cooperative_bps },
        investor_share: Money::new(row.get("investor_share").ok_or_else(|| missing("investor_share"))?, currency),
        business_share: Money::new(row.get("business_share").ok_or_else(|| missing("business_share"))?, currency),
        cooperative_share: Money::new(
            row.get("cooperative_share").ok_or_else(|| missing("cooperative_share"))?,
            currency,
        ),
        verification_status: parse_verification_status(&status)?,
        rejection_reason: row.get("rejection_reason"),
        created_at: row.get("created_at").ok_or_else(|| missing("created_at"))?,
        updated_at: row.get("updated_at").ok_or_else(|| missing("updated_at"))?,
    })
}

fn distribution_from_row(row: &Row) -> std::result::Result<ProfitDistribution, TxError> {
    let missing = |col: &str| TxError::Core(ledger_model::Error::NotFound(format!("profit_distribution: missing {col} column")));
    let currency_code: String = row.get("currency").ok_or_else(|| missing("currency"))?;
    let currency = ledger_model::Currency::from_code(&currency_code)
        .ok_or_else(|| TxError::Core(ledger_model::Error::BadKey(format!("unknown currency {currency_code}"))))?;
    let status: String = row.get("status").ok_or_else(|| missing("status"))?;

    Ok(ProfitDistribution {
        id: row.get::<Uuid>("id").map(DistributionId::from).ok_or_else(|| missing("id"))?,
        project_id: row.get::<Uuid>("project_id").map(ProjectId::from).ok_or_else(|| missing("project_id"))?,
        profit_calculation_id: row
            .get::<Uuid>("profit_calculation_id")
            .map(ProfitCalculationId::from)
            .ok_or_else(|| missing("profit_calculation_id"))?,
        total_distribution_amount: Money::new(
            row.get("total_distribution_amount").ok_or_else(|| missing("total_distribution_amount"))?,
            currency,
        ),
        status: parse_distribution_status(&status)?,
        created_at: row.get("created_at").ok_or_else(|| missing("created_at"))?,
        completed_at: row.get("completed_at"),
    })
}

fn tx_not_found(entity: &str, id: impl std::fmt::Display) -> TxError {
    TxError::Core(ledger_model::Error::NotFound(format!("{entity} {id}")))
}

impl FinancialEngine {
    /// Record one period's revenue/expenses and split the resulting net
    /// profit by `sharing_ratio` (spec §4.4 step 4). The three shares are
    /// allocated via the same residue rule `financial_engine::rounding` uses
    /// for per-investor shares, so `investor_share + business_share +
    /// cooperative_share == net` holds exactly, not just approximately.
    pub async fn create_profit_calculation(
        &self,
        idempotency_key: Option<&str>,
        req: CreateProfitCalculationRequest,
    ) -> Result<IdempotentOutcome<ProfitCalculationResponse>> {
        self.run_idempotent(req.created_by, "create_profit_calculation", idempotency_key, &req, || async {
            self.create_profit_calculation_inner(&req).await
        })
        .await
    }

    async fn create_profit_calculation_inner(&self, req: &CreateProfitCalculationRequest) -> Result<ProfitCalculationResponse> {
        req.sharing_ratio.validate()?;
        if req.period_end < req.period_start {
            return Err(Error::Core(ledger_model::Error::BadKey(
                "period_end must not precede period_start".to_string(),
            )));
        }
        let net = req.revenue - req.expenses;
        if net < Decimal::ZERO {
            return Err(Error::Core(ledger_model::Error::PolicyViolation(format!(
                "net profit {net} is negative; a loss cannot be distributed"
            ))));
        }

        let calculation_id = ProfitCalculationId::new_v7();
        let project_shard = self.router.route(req.project_id.as_bytes());
        let ctx = self.coordinator.context();

        let project_id = req.project_id;
        let created_by = req.created_by;
        let period_start = req.period_start;
        let period_end = req.period_end;
        let revenue = req.revenue;
        let expenses = req.expenses;
        let ratio = req.sharing_ratio;

        let calculation = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let project_rows = tx
                        .query_on(project_shard, SELECT_PROJECT_FOR_UPDATE, &[project_id.as_uuid().into()])
                        .await?;
                    let project_row = project_rows.first().ok_or_else(|| tx_not_found("project", project_id))?;
                    let project = rows::project_snapshot(project_row)?;

                    let entries = [
                        Weighted { id: 0u8, weight: Decimal::from(ratio.investor_bps) },
                        Weighted { id: 1u8, weight: Decimal::from(ratio.business_bps) },
                        Weighted { id: 2u8, weight: Decimal::from(ratio.cooperative_bps) },
                    ];
                    let shares = allocate_with_residue(net, &entries).map_err(TxError::Core)?;
                    let investor_share = shares.iter().find(|(id, _)| *id == 0).unwrap().1;
                    let business_share = shares.iter().find(|(id, _)| *id == 1).unwrap().1;
                    let cooperative_share = shares.iter().find(|(id, _)| *id == 2).unwrap().1;

                    let now = Utc::now();
                    tx.exec_on(
                        project_shard,
                        INSERT_CALCULATION_SQL,
                        &[
                            calculation_id.as_uuid().into(),
                            project_id.as_uuid().into(),
                            period_start.into(),
                            period_end.into(),
                            revenue.into(),
                            expenses.into(),
                            net.into(),
                            project.currency.code().into(),
                            i64::from(ratio.investor_bps).into(),
                            i64::from(ratio.business_bps).into(),
                            i64::from(ratio.cooperative_bps).into(),
                            investor_share.into(),
                            business_share.into(),
                            cooperative_share.into(),
                            verification_status_label(VerificationStatus::Pending).into(),
                            now.into(),
                        ],
                    )
                    .await?;

                    let calculation = ProfitCalculation {
                        id: calculation_id,
                        project_id,
                        period_start,
                        period_end,
                        revenue: Money::new(revenue, project.currency),
                        expenses: Money::new(expenses, project.currency),
                        net: Money::new(net, project.currency),
                        sharing_ratio: ratio,
                        investor_share: Money::new(investor_share, project.currency),
                        business_share: Money::new(business_share, project.currency),
                        cooperative_share: Money::new(cooperative_share, project.currency),
                        verification_status: VerificationStatus::Pending,
                        rejection_reason: None,
                        created_at: now,
                        updated_at: now,
                    };

                    let entry = audit_log::AuditEntry::success(
                        "profit_calculation",
                        calculation_id.as_uuid(),
                        "create_profit_calculation",
                        created_by.as_uuid(),
                    )
                    .with_snapshot(None, serde_json::to_value(&calculation).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(calculation)
                })
            })
            .await?;

        Ok(ProfitCalculationResponse { calculation })
    }

    /// Review a pending profit calculation: `Pending` → `Verified`, or
    /// `Pending` → `Rejected` with a required reason (spec §4.4 step 4).
    pub async fn verify_profit_calculation(
        &self,
        idempotency_key: Option<&str>,
        req: VerifyProfitCalculationRequest,
    ) -> Result<IdempotentOutcome<ProfitCalculationResponse>> {
        self.run_idempotent(req.verified_by, "verify_profit_calculation", idempotency_key, &req, || async {
            self.verify_profit_calculation_inner(&req).await
        })
        .await
    }

    async fn verify_profit_calculation_inner(&self, req: &VerifyProfitCalculationRequest) -> Result<ProfitCalculationResponse> {
        if !req.approve && req.rejection_reason.as_deref().unwrap_or("").trim().is_empty() {
            return Err(Error::Core(ledger_model::Error::PolicyViolation(
                "rejecting a profit calculation requires a non-empty reason".to_string(),
            )));
        }

        let project_id = req.project_id;
        let calculation_id = req.calculation_id;
        let approve = req.approve;
        let reason = req.rejection_reason.clone();
        let verified_by = req.verified_by;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let calculation = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let rows = tx
                        .query_on(
                            project_shard,
                            SELECT_CALCULATION_FOR_UPDATE,
                            &[calculation_id.as_uuid().into(), project_id.as_uuid().into()],
                        )
                        .await?;
                    let row = rows.first().ok_or_else(|| tx_not_found("profit_calculation", calculation_id))?;
                    let before = calculation_from_row(row)?;

                    if before.verification_status != VerificationStatus::Pending {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "profit calculation {calculation_id} is {:?}, not pending",
                            before.verification_status
                        ))));
                    }

                    let new_status = if approve { VerificationStatus::Verified } else { VerificationStatus::Rejected };
                    let now = Utc::now();
                    tx.exec_on(
                        project_shard,
                        UPDATE_CALCULATION_VERIFICATION_SQL,
                        &[
                            verification_status_label(new_status).into(),
                            reason.clone().map(ledger_model::SqlValue::from).unwrap_or(ledger_model::SqlValue::Null),
                            now.into(),
                            calculation_id.as_uuid().into(),
                        ],
                    )
                    .await?;

                    let after = ProfitCalculation {
                        verification_status: new_status,
                        rejection_reason: reason.clone(),
                        updated_at: now,
                        ..before.clone()
                    };

                    let mut entry = audit_log::AuditEntry::success(
                        "profit_calculation",
                        calculation_id.as_uuid(),
                        "verify_profit_calculation",
                        verified_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok());
                    if let Some(reason) = &reason {
                        entry = entry.with_reason(reason.clone());
                    }
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(after)
                })
            })
            .await?;

        Ok(ProfitCalculationResponse { calculation })
    }

    /// Open a distribution bound to exactly one verified calculation (spec
    /// §4.4 step 5). Refuses a second distribution against the same
    /// calculation.
    pub async fn create_distribution(
        &self,
        idempotency_key: Option<&str>,
        req: CreateDistributionRequest,
    ) -> Result<IdempotentOutcome<DistributionResponse>> {
        self.run_idempotent(req.created_by, "create_distribution", idempotency_key, &req, || async {
            self.create_distribution_inner(&req).await
        })
        .await
    }

    async fn create_distribution_inner(&self, req: &CreateDistributionRequest) -> Result<DistributionResponse> {
        let project_id = req.project_id;
        let calculation_id = req.calculation_id;
        let created_by = req.created_by;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let distribution = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let calc_rows = tx
                        .query_on(
                            project_shard,
                            SELECT_CALCULATION_FOR_UPDATE,
                            &[calculation_id.as_uuid().into(), project_id.as_uuid().into()],
                        )
                        .await?;
                    let calc_row = calc_rows.first().ok_or_else(|| tx_not_found("profit_calculation", calculation_id))?;
                    let calculation = calculation_from_row(calc_row)?;

                    if calculation.verification_status != VerificationStatus::Verified {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "profit calculation {calculation_id} is {:?}, not verified",
                            calculation.verification_status
                        ))));
                    }

                    let existing = tx
                        .query_on(project_shard, SELECT_DISTRIBUTION_FOR_CALCULATION, &[calculation_id.as_uuid().into()])
                        .await?;
                    if !existing.is_empty() {
                        return Err(TxError::Core(ledger_model::Error::AlreadyFinalized(format!(
                            "profit calculation {calculation_id} already has an open distribution"
                        ))));
                    }

                    let distribution_id = DistributionId::new_v7();
                    let now = Utc::now();
                    tx.exec_on(
                        project_shard,
                        INSERT_DISTRIBUTION_SQL,
                        &[
                            distribution_id.as_uuid().into(),
                            project_id.as_uuid().into(),
                            calculation_id.as_uuid().into(),
                            calculation.investor_share.amount().into(),
                            calculation.investor_share.currency().code().into(),
                            distribution_status_label(DistributionStatus::Pending).into(),
                            now.into(),
                        ],
                    )
                    .await?;

                    let distribution = ProfitDistribution {
                        id: distribution_id,
                        project_id,
                        profit_calculation_id: calculation_id,
                        total_distribution_amount: calculation.investor_share,
                        status: DistributionStatus::Pending,
                        created_at: now,
                        completed_at: None,
                    };

                    let entry = audit_log::AuditEntry::success(
                        "profit_distribution",
                        distribution_id.as_uuid(),
                        "create_distribution",
                        created_by.as_uuid(),
                    )
                    .with_snapshot(None, serde_json::to_value(&distribution).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(distribution)
                })
            })
            .await?;

        Ok(DistributionResponse { distribution, shares: Vec::new() })
    }

    /// Withdraw a distribution before it has been processed.
    pub async fn cancel_distribution(
        &self,
        idempotency_key: Option<&str>,
        req: CancelDistributionRequest,
    ) -> Result<IdempotentOutcome<DistributionResponse>> {
        self.run_idempotent(req.cancelled_by, "cancel_distribution", idempotency_key, &req, || async {
            self.cancel_distribution_inner(&req).await
        })
        .await
    }

    async fn cancel_distribution_inner(&self, req: &CancelDistributionRequest) -> Result<DistributionResponse> {
        let project_id = req.project_id;
        let distribution_id = req.distribution_id;
        let cancelled_by = req.cancelled_by;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let distribution = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let rows = tx
                        .query_on(
                            project_shard,
                            SELECT_DISTRIBUTION_FOR_UPDATE,
                            &[distribution_id.as_uuid().into(), project_id.as_uuid().into()],
                        )
                        .await?;
                    let row = rows.first().ok_or_else(|| tx_not_found("profit_distribution", distribution_id))?;
                    let before = distribution_from_row(row)?;

                    if before.status != DistributionStatus::Pending {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "distribution {distribution_id} is {:?}, not pending",
                            before.status
                        ))));
                    }

                    let now = Utc::now();
                    tx.exec_on(
                        project_shard,
                        UPDATE_DISTRIBUTION_STATUS_SQL,
                        &[
                            distribution_status_label(DistributionStatus::Cancelled).into(),
                            now.into(),
                            distribution_id.as_uuid().into(),
                        ],
                    )
                    .await?;

                    let after = ProfitDistribution { status: DistributionStatus::Cancelled, completed_at: Some(now), ..before.clone() };

                    let entry = audit_log::AuditEntry::success(
                        "profit_distribution",
                        distribution_id.as_uuid(),
                        "cancel_distribution",
                        cancelled_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok(after)
                })
            })
            .await?;

        Ok(DistributionResponse { distribution, shares: Vec::new() })
    }

    /// Compute and settle every investor's share of a pending distribution
    /// (spec §4.4 step 5): weight by original investment amount, allocate
    /// with the pinned largest-amount/id-ascending residue rule, withhold
    /// tax per investor's currently-active `TaxDocumentation` rate, and
    /// write one `InvestorProfitShare` row per investment. If no
    /// active/completed investment exists to allocate across, the
    /// distribution is marked `Failed` rather than erroring the caller —
    /// the request itself was well-formed, the project simply has nothing
    /// left to pay out to.
    pub async fn process_distribution(
        &self,
        idempotency_key: Option<&str>,
        req: ProcessDistributionRequest,
    ) -> Result<IdempotentOutcome<DistributionResponse>> {
        self.run_idempotent(req.processed_by, "process_distribution", idempotency_key, &req, || async {
            self.process_distribution_inner(&req).await
        })
        .await
    }

    async fn process_distribution_inner(&self, req: &ProcessDistributionRequest) -> Result<DistributionResponse> {
        let project_id = req.project_id;
        let distribution_id = req.distribution_id;
        let processed_by = req.processed_by;
        let project_shard = self.router.route(project_id.as_bytes());
        let ctx = self.coordinator.context();

        let (distribution, shares) = self
            .coordinator
            .execute(&ctx, move |tx: &TxHandle<'_>| {
                Box::pin(async move {
                    let rows = tx
                        .query_on(
                            project_shard,
                            SELECT_DISTRIBUTION_FOR_UPDATE,
                            &[distribution_id.as_uuid().into(), project_id.as_uuid().into()],
                        )
                        .await?;
                    let row = rows.first().ok_or_else(|| tx_not_found("profit_distribution", distribution_id))?;
                    let before = distribution_from_row(row)?;

                    if before.status != DistributionStatus::Pending {
                        return Err(TxError::Core(ledger_model::Error::IllegalTransition(format!(
                            "distribution {distribution_id} is {:?}, not pending",
                            before.status
                        ))));
                    }

                    let investment_rows = tx
                        .query_on(project_shard, SELECT_PROJECT_INVESTMENTS, &[project_id.as_uuid().into()])
                        .await?;

                    let now = Utc::now();
                    let total = before.total_distribution_amount.amount();
                    let currency = before.total_distribution_amount.currency();

                    if investment_rows.is_empty() {
                        tx.exec_on(
                            project_shard,
                            UPDATE_DISTRIBUTION_STATUS_SQL,
                            &[
                                distribution_status_label(DistributionStatus::Failed).into(),
                                now.into(),
                                distribution_id.as_uuid().into(),
                            ],
                        )
                        .await?;

                        let after = ProfitDistribution { status: DistributionStatus::Failed, completed_at: Some(now), ..before.clone() };
                        let entry = audit_log::AuditEntry::success(
                            "profit_distribution",
                            distribution_id.as_uuid(),
                            "process_distribution",
                            processed_by.as_uuid(),
                        )
                        .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok())
                        .with_reason("no active or completed investments to allocate the distribution across".to_string())
                        .with_status(audit_log::AuditStatus::Failed, audit_log::AuditSeverity::Error);
                        self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                        return Ok((after, Vec::new()));
                    }

                    struct InvestmentRow {
                        id: InvestmentId,
                        investor_id: UserId,
                        amount: Decimal,
                    }
                    let mut weights: Vec<Weighted<Uuid>> = Vec::with_capacity(investment_rows.len());
                    let mut by_id = std::collections::HashMap::new();
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
                        weights.push(Weighted { id: id.as_uuid(), weight: amount });
                        by_id.insert(id.as_uuid(), InvestmentRow { id, investor_id, amount });
                    }

                    let allocated = allocate_with_residue(total, &weights).map_err(TxError::Core)?;

                    tx.exec_on(
                        project_shard,
                        UPDATE_DISTRIBUTION_STATUS_SQL,
                        &[
                            distribution_status_label(DistributionStatus::Processing).into(),
                            ledger_model::SqlValue::Null,
                            distribution_id.as_uuid().into(),
                        ],
                    )
                    .await?;

                    let mut shares = Vec::with_capacity(allocated.len());
                    for (investment_uuid, gross) in allocated {
                        let inv = by_id.get(&investment_uuid).expect("allocation only covers known investments");
                        let tax_rows = tx
                            .query_on(
                                project_shard,
                                SELECT_ACTIVE_TAX_DOCUMENTATION,
                                &[inv.investor_id.as_uuid().into(), now.into()],
                            )
                            .await?;
                        let rate_bps: u32 = tax_rows.first().and_then(|r| r.get::<i64>("rate_bps")).unwrap_or(0) as u32;
                        let rate = BasisPoints::new(rate_bps).unwrap_or_else(|| BasisPoints::new(0).expect("0 is always valid"));
                        let tax = ledger_model::money::round_currency(rate.apply(gross));
                        let net_amount = gross - tax;
                        let share_bps = ((gross * Decimal::from(BASIS_POINTS_WHOLE)) / total)
                            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
                            .to_u32()
                            .unwrap_or(0);

                        let share_id = InvestorShareId::new_v7();
                        tx.exec_on(
                            project_shard,
                            INSERT_SHARE_SQL,
                            &[
                                share_id.as_uuid().into(),
                                distribution_id.as_uuid().into(),
                                inv.id.as_uuid().into(),
                                inv.investor_id.as_uuid().into(),
                                inv.amount.into(),
                                currency.code().into(),
                                i64::from(share_bps).into(),
                                gross.into(),
                                tax.into(),
                                net_amount.into(),
                                currency.code().into(),
                                share_status_label(ShareStatus::Completed).into(),
                                now.into(),
                            ],
                        )
                        .await?;

                        shares.push(InvestorProfitShare {
                            id: share_id,
                            distribution_id,
                            investment_id: inv.id,
                            investor_id: inv.investor_id,
                            original_investment_amount: Money::new(inv.amount, currency),
                            share_bps,
                            gross: Money::new(gross, currency),
                            tax: Money::new(tax, currency),
                            net: Money::new(net_amount, currency),
                            status: ShareStatus::Completed,
                            created_at: now,
                        });
                    }

                    tx.exec_on(
                        project_shard,
                        UPDATE_DISTRIBUTION_STATUS_SQL,
                        &[
                            distribution_status_label(DistributionStatus::Completed).into(),
                            now.into(),
                            distribution_id.as_uuid().into(),
                        ],
                    )
                    .await?;

                    let after = ProfitDistribution { status: DistributionStatus::Completed, completed_at: Some(now), ..before.clone() };

                    let entry = audit_log::AuditEntry::success(
                        "profit_distribution",
                        distribution_id.as_uuid(),
                        "process_distribution",
                        processed_by.as_uuid(),
                    )
                    .with_snapshot(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok());
                    self.audit.record(tx, project_shard, &entry).await.map_err(tx_error_from_audit)?;

                    Ok((after, shares))
                })
            })
            .await?;

        Ok(DistributionResponse { distribution, shares })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_calculation_row() -> Row {
        let mut columns = std::collections::BTreeMap::new();
        let now = Utc::now();
        columns.insert("id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("project_id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("period_start".into(), json!(now.to_rfc3339()));
        columns.insert("period_end".into(), json!(now.to_rfc3339()));
        columns.insert("revenue".into(), json!("10000.00"));
        columns.insert("expenses".into(), json!("4000.00"));
        columns.insert("net".into(), json!("6000.00"));
        columns.insert("currency".into(), json!("IDR"));
        columns.insert("sharing_investor_bps".into(), json!(6000));
        columns.insert("sharing_business_bps".into(), json!(3000));
        columns.insert("sharing_cooperative_bps".into(), json!(1000));
        columns.insert("investor_share".into(), json!("3600.00"));
        columns.insert("business_share".into(), json!("1800.00"));
        columns.insert("cooperative_share".into(), json!("600.00"));
        columns.insert("verification_status".into(), json!("verified"));
        columns.insert("rejection_reason".into(), serde_json::Value::Null);
        columns.insert("created_at".into(), json!(now.to_rfc3339()));
        columns.insert("updated_at".into(), json!(now.to_rfc3339()));
        Row { columns }
    }

    fn sample_distribution_row() -> Row {
        let mut columns = std::collections::BTreeMap::new();
        let now = Utc::now();
        columns.insert("id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("project_id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("profit_calculation_id".into(), json!(Uuid::new_v4().to_string()));
        columns.insert("total_distribution_amount".into(), json!("3600.00"));
        columns.insert("currency".into(), json!("IDR"));
        columns.insert("status".into(), json!("processing"));
        columns.insert("created_at".into(), json!(now.to_rfc3339()));
        columns.insert("completed_at".into(), serde_json::Value::Null);
        Row { columns }
    }

    #[test]
    fn calculation_from_row_decodes_ratios_and_shares() {
        let calc = calculation_from_row(&sample_calculation_row()).expect("row decodes");
        assert_eq!(calc.verification_status, VerificationStatus::Verified);
        assert_eq!(calc.sharing_ratio.investor_bps, 6000);
        assert_eq!(calc.sharing_ratio.business_bps, 3000);
        assert_eq!(calc.sharing_ratio.cooperative_bps, 1000);
        assert_eq!(
            calc.investor_share.amount() + calc.business_share.amount() + calc.cooperative_share.amount(),
            calc.net.amount()
        );
    }

    #[test]
    fn calculation_from_row_rejects_unknown_verification_status() {
        let mut row = sample_calculation_row();
        row.columns.insert("verification_status".into(), json!("maybe"));
        let err = calculation_from_row(&row).unwrap_err();
        assert!(matches!(err, TxError::Core(ledger_model::Error::BadKey(_))));
    }

    #[test]
    fn distribution_from_row_decodes_full_shape() {
        let dist = distribution_from_row(&sample_distribution_row()).expect("row decodes");
        assert_eq!(dist.status, DistributionStatus::Processing);
        assert_eq!(dist.total_distribution_amount.amount(), Decimal::new(360000, 2));
        assert!(dist.completed_at.is_none());
    }

    #[test]
    fn verification_status_round_trips_through_its_label() {
        for s in [VerificationStatus::Pending, VerificationStatus::Verified, VerificationStatus::Rejected] {
            assert_eq!(parse_verification_status(verification_status_label(s)).unwrap(), s);
        }
    }

    #[test]
    fn distribution_status_round_trips_through_its_label() {
        for s in [
            DistributionStatus::Pending,
            DistributionStatus::Processing,
            DistributionStatus::Completed,
            DistributionStatus::Failed,
            DistributionStatus::Cancelled,
        ] {
            assert_eq!(parse_distribution_status(distribution_status_label(s)).unwrap(), s);
        }
    }

    #[test]
    fn share_status_labels_are_distinct() {
        let labels = [
            share_status_label(ShareStatus::Pending),
            share_status_label(ShareStatus::Processed),
            share_status_label(ShareStatus::Completed),
            share_status_label(ShareStatus::Failed),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
