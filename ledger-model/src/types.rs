//! Entity types for the ledger, per spec §3.
//!
//! These are plain data records; the state-machine behavior that mutates
//! them lives in `financial-engine`. Keeping them here (rather than in the
//! engine crate) mirrors the teacher's layering, where `ledger-core::types`
//! is the shared vocabulary every other crate imports.

use crate::ids::{
    CooperativeId, DisbursementId, DistributionId, EscrowAccountId, FundUsageId, InvestmentId,
    InvestorRefundId, InvestorShareId, ProfitCalculationId, ProjectId, RefundId, UserId,
};
use crate::money::{Currency, Money, SharingRatio};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Status of an escrow account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Accepting credits and debits normally.
    Active,
    /// Temporarily frozen; no debits or credits accepted.
    Suspended,
    /// Permanently closed.
    Closed,
}

/// One escrow account per cooperative (spec §3).
///
/// Invariant: `balance == Σ confirmed credits − Σ confirmed debits`, enforced
/// by `financial-engine` only ever mutating `balance` inside a coordinator
/// transaction alongside the credit/debit it represents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowAccount {
    /// Identifier of this escrow account.
    pub id: EscrowAccountId,
    /// Cooperative that owns this account.
    pub cooperative_id: CooperativeId,
    /// Current balance.
    pub balance: Money,
    /// Cumulative amount credited from investments over the account's life.
    pub total_invested_in: Money,
    /// Cumulative amount debited via disbursements and refunds.
    pub total_distributed_out: Money,
    /// Lifecycle status.
    pub status: EscrowStatus,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Investment type: whether the investor intends to fully or partially fund
/// the remaining goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentType {
    /// The investment alone is intended to close the funding goal.
    Full,
    /// The investment is one of several contributing to the goal.
    Partial,
}

/// Lifecycle state of an investment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    /// Submitted, awaiting cooperative approval.
    Pending,
    /// Approved; funds have been credited to escrow.
    Approved,
    /// Actively funding a project that has not yet closed.
    Active,
    /// The project this investment funded has completed its lifecycle.
    Completed,
    /// Rejected before any funds moved.
    Rejected,
    /// Cancelled (by owner pre-approval, or via a refund flow post-approval).
    Cancelled,
    /// Refunded in full via a `FundRefund` flow.
    Refunded,
}

/// An investor's association with a project (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    /// Identifier of this investment.
    pub id: InvestmentId,
    /// The investing user.
    pub investor_id: UserId,
    /// The project being invested in.
    pub project_id: ProjectId,
    /// The escrow account funds are credited to on approval.
    pub escrow_account_id: EscrowAccountId,
    /// Amount invested.
    pub amount: Money,
    /// Full or partial.
    pub investment_type: InvestmentType,
    /// Current lifecycle state.
    pub status: InvestmentStatus,
    /// Set when approved; who approved it.
    pub approved_by: Option<UserId>,
    /// Set when approved.
    pub approved_at: Option<DateTime<Utc>>,
    /// Set when rejected; required reason.
    pub rejection_reason: Option<String>,
    /// Transfer reference minted on approval (`TXN-<unix>-<8hex>`).
    pub transfer_reference: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of a project's funding round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Being authored, not yet visible to investors.
    Draft,
    /// Submitted for cooperative review.
    Submitted,
    /// Approved and open (or about to open) for funding.
    Approved,
    /// Currently accepting investments.
    Active,
    /// Funding window closed (goal met or deadline passed).
    Closed,
    /// Withdrawn by its owner or the cooperative.
    Cancelled,
}

/// The funding-relevant view of a project (spec §3) — the project's
/// descriptive fields (name, pitch, media) are out of scope per spec §1 and
/// are not modeled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Identifier of this project.
    pub id: ProjectId,
    /// Cooperative that owns this project.
    pub cooperative_id: CooperativeId,
    /// Owning business's user id.
    pub owner_id: UserId,
    /// Currency all funding amounts for this project are denominated in.
    pub currency: Currency,
    /// Target amount to raise.
    pub funding_goal: Money,
    /// Amount raised so far (sum of Active/Completed investments).
    pub current_funding: Money,
    /// Minimum amount that must be raised for the round to be viable.
    pub min_funding_required: Money,
    /// Deadline after which an unmet `min_funding_required` triggers a refund.
    pub funding_deadline: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: ProjectStatus,
    /// Optional per-investment amount bounds.
    pub investment_limits: Option<InvestmentLimits>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Optional per-project bounds on a single investment's amount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InvestmentLimits {
    /// Smallest amount accepted.
    pub min_amount: Decimal,
    /// Largest amount accepted.
    pub max_amount: Decimal,
}

/// Cooperative-wide investment policy, filling the gap spec §4.4 leaves
/// ("inside the cooperative's investment-policy limits") — shaped like the
/// teacher's `risk_engine::limits::LimitConfig`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CooperativePolicy {
    /// Smallest investment the cooperative allows, platform-wide.
    pub min_investment: Decimal,
    /// Largest investment the cooperative allows, platform-wide.
    pub max_investment: Decimal,
    /// Largest share of one project's funding goal a single investor may
    /// hold, in basis points (0 disables the check).
    pub max_investor_concentration_bps: u32,
}

impl Default for CooperativePolicy {
    fn default() -> Self {
        Self {
            min_investment: Decimal::from(10_000),       // IDR 10,000
            max_investment: Decimal::from(2_000_000_000), // IDR 2bn
            max_investor_concentration_bps: 4_000,         // 40%
        }
    }
}

/// Disbursement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisbursementType {
    /// Tied to a specific project milestone.
    Milestone,
    /// A partial release not tied to the final milestone.
    Partial,
    /// The final release closing out the project's funded amount.
    Final,
}

/// Lifecycle state of a disbursement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisbursementStatus {
    /// Requested by the project owner.
    Pending,
    /// Approved by a cooperative admin.
    Approved,
    /// Funds have left escrow.
    Disbursed,
    /// Rejected before any funds moved.
    Rejected,
    /// Withdrawn before approval.
    Cancelled,
}

/// A release of escrowed funds to a business owner against a milestone
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundDisbursement {
    /// Identifier of this disbursement.
    pub id: DisbursementId,
    /// Project this disbursement draws against.
    pub project_id: ProjectId,
    /// Business owner receiving the funds.
    pub business_owner_id: UserId,
    /// Milestone identifier (opaque to the engine; owned by out-of-scope
    /// project-management CRUD).
    pub milestone_id: Option<String>,
    /// Amount to disburse.
    pub amount: Money,
    /// Milestone, partial, or final.
    pub disbursement_type: DisbursementType,
    /// Current lifecycle state.
    pub status: DisbursementStatus,
    /// Bank reference minted when `Disbursed`.
    pub bank_reference: Option<String>,
    /// Who approved it.
    pub approved_by: Option<UserId>,
    /// When it was approved.
    pub approved_at: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Category a `FundUsage` entry is classified under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCategory {
    /// Raw materials or inventory.
    Materials,
    /// Labor and payroll.
    Labor,
    /// Equipment purchases or rental.
    Equipment,
    /// Logistics and distribution.
    Logistics,
    /// Marketing and customer acquisition.
    Marketing,
    /// Anything not covered above.
    Other,
}

/// A categorized spend entry against a disbursement (spec §3, advisory
/// invariant `Σ usage ≤ disbursed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundUsage {
    /// Identifier of this usage entry.
    pub id: FundUsageId,
    /// Disbursement this spend is reported against.
    pub disbursement_id: DisbursementId,
    /// Amount spent.
    pub amount: Money,
    /// Spend category.
    pub category: UsageCategory,
    /// Free-text description.
    pub description: String,
    /// Whether a cooperative admin has verified this entry.
    pub verified: bool,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// Verification status of a profit calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Awaiting cooperative review.
    Pending,
    /// Reviewed and accepted.
    Verified,
    /// Reviewed and rejected.
    Rejected,
}

/// A reported revenue/expense period for one project (spec §3).
///
/// Invariant: `investor_share + business_share + cooperative_share == net`
/// up to the rounding policy in §4.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitCalculation {
    /// Identifier of this calculation.
    pub id: ProfitCalculationId,
    /// Project this period's P&L applies to.
    pub project_id: ProjectId,
    /// Period start (inclusive).
    pub period_start: DateTime<Utc>,
    /// Period end (inclusive).
    pub period_end: DateTime<Utc>,
    /// Reported revenue for the period.
    pub revenue: Money,
    /// Reported expenses for the period.
    pub expenses: Money,
    /// `revenue - expenses`.
    pub net: Money,
    /// Sharing ratio applied to `net`.
    pub sharing_ratio: SharingRatio,
    /// `net` routed to investors, before per-investor allocation.
    pub investor_share: Money,
    /// `net` routed to the business owner.
    pub business_share: Money,
    /// `net` routed to the cooperative.
    pub cooperative_share: Money,
    /// Review state.
    pub verification_status: VerificationStatus,
    /// Reason given if rejected.
    pub rejection_reason: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of a profit distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    /// Created, rows not yet computed/processed.
    Pending,
    /// Rows are being paid out.
    Processing,
    /// All rows reached `Completed`.
    Completed,
    /// At least one row failed; no row is `Completed`.
    Failed,
    /// Withdrawn before processing.
    Cancelled,
}

/// One periodic payout driven by exactly one verified `ProfitCalculation`
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitDistribution {
    /// Identifier of this distribution.
    pub id: DistributionId,
    /// Project this distribution pays out for.
    pub project_id: ProjectId,
    /// The verified calculation this distribution is bound to.
    pub profit_calculation_id: ProfitCalculationId,
    /// Total amount distributed to investors (must equal
    /// `Σ InvestorProfitShare.gross`).
    pub total_distribution_amount: Money,
    /// Current lifecycle state.
    pub status: DistributionStatus,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// When processing finished (success or failure).
    pub completed_at: Option<DateTime<Utc>>,
}

/// Lifecycle state of one investor's share within a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareStatus {
    /// Computed, not yet paid.
    Pending,
    /// Payment initiated.
    Processed,
    /// Payment confirmed.
    Completed,
    /// Payment failed.
    Failed,
}

/// One investor's row within a `ProfitDistribution` (spec §3).
///
/// Invariant across all rows of one distribution:
/// `Σ gross == distribution.total_distribution_amount` exactly, via the
/// largest-amount/id-ascending residue assignment rule in
/// `financial_engine::rounding`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestorProfitShare {
    /// Identifier of this share row.
    pub id: InvestorShareId,
    /// Distribution this row belongs to.
    pub distribution_id: DistributionId,
    /// The investment this share is computed from.
    pub investment_id: InvestmentId,
    /// Investor receiving this share.
    pub investor_id: UserId,
    /// The original investment amount used as the allocation weight.
    pub original_investment_amount: Money,
    /// This investor's share of `total_distribution_amount`, in basis points
    /// (derived, not authoritative — the authoritative value is `gross`).
    pub share_bps: u32,
    /// Gross amount before tax.
    pub gross: Money,
    /// Tax withheld.
    pub tax: Money,
    /// `gross - tax`.
    pub net: Money,
    /// Current lifecycle state.
    pub status: ShareStatus,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// The rate at which tax is withheld from one investor's profit shares,
/// referenced by spec §4.4 step 5 ("active TaxDocumentation rate") — added
/// because the distillation assumes this record exists without naming its
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxDocumentation {
    /// Investor this rate applies to.
    pub investor_id: UserId,
    /// Withholding rate, in basis points.
    pub rate_bps: u32,
    /// First distribution date this rate applies from (inclusive).
    pub effective_from: DateTime<Utc>,
    /// Last distribution date this rate applies to (inclusive), or `None`
    /// if still active.
    pub effective_to: Option<DateTime<Utc>>,
}

impl TaxDocumentation {
    /// Whether this rate is active at the given instant.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.effective_from <= at && self.effective_to.map_or(true, |end| at <= end)
    }
}

/// What triggered a `FundRefund`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundTrigger {
    /// The funding deadline passed with `current_funding < min_funding_required`.
    MinimumFundingFailed,
    /// The project was cancelled outright.
    ProjectCancelled,
    /// An individual investor requested a refund.
    InvestorRequest,
}

/// Lifecycle state of a refund (project-level or per-investor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Created, fan-out not yet processed.
    Pending,
    /// Fan-out rows are being paid out.
    Processing,
    /// All fan-out rows completed.
    Completed,
    /// At least one fan-out row failed.
    Failed,
    /// Withdrawn before processing.
    Cancelled,
}

/// A project-level refund event (spec §3) that fans out to one
/// `InvestorRefund` row per affected investment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundRefund {
    /// Identifier of this refund.
    pub id: RefundId,
    /// Project being refunded.
    pub project_id: ProjectId,
    /// What triggered this refund.
    pub trigger: RefundTrigger,
    /// Total amount refunded across all fan-out rows (including fees).
    pub total_amount: Money,
    /// Current lifecycle state.
    pub status: RefundStatus,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// When processing finished (success or failure).
    pub completed_at: Option<DateTime<Utc>>,
}

/// One investor's refund row within a `FundRefund` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestorRefund {
    /// Identifier of this refund row.
    pub id: InvestorRefundId,
    /// Parent project-level refund.
    pub refund_id: RefundId,
    /// The investment being refunded.
    pub investment_id: InvestmentId,
    /// Investor receiving the refund.
    pub investor_id: UserId,
    /// The original investment amount.
    pub original_amount: Money,
    /// Processing fee charged pro rata against this refund.
    pub processing_fee: Money,
    /// `original_amount - processing_fee`.
    pub net_amount: Money,
    /// Current lifecycle state.
    pub status: RefundStatus,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_documentation_active_window() {
        let doc = TaxDocumentation {
            investor_id: UserId::new_v4(),
            rate_bps: 1000,
            effective_from: "2025-01-01T00:00:00Z".parse().unwrap(),
            effective_to: Some("2025-12-31T23:59:59Z".parse().unwrap()),
        };
        assert!(doc.is_active_at("2025-06-01T00:00:00Z".parse().unwrap()));
        assert!(!doc.is_active_at("2026-01-01T00:00:00Z".parse().unwrap()));
    }
}
