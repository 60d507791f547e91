//! Opaque 128-bit identifiers.
//!
//! Every entity in §3 is named by a uniformly-distributed 128-bit value that
//! doubles as the sharding key of the record it names. We back it with
//! `uuid::Uuid` (v4 for client-visible ids, v7 for server-generated
//! sequence-friendly ones) rather than inventing a bespoke 16-byte type —
//! the teacher's `ledger-core::types` does the analogous thing with
//! `AccountId`, and `uuid` is already load-bearing across the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A typed wrapper around an opaque 128-bit identifier.
///
/// The `Kind` marker prevents accidentally routing a `ProjectId` where an
/// `InvestmentId` was expected; it carries no runtime cost.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<Kind> {
    value: Uuid,
    #[serde(skip)]
    _marker: std::marker::PhantomData<fn() -> Kind>,
}

impl<Kind> Id<Kind> {
    /// Generate a fresh random identifier.
    pub fn new_v4() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Generate a time-ordered identifier (used for server-assigned rows
    /// where insertion order should roughly track id order).
    pub fn new_v7() -> Self {
        Self::from_uuid(Uuid::now_v7())
    }

    /// Wrap an existing `Uuid`.
    pub const fn from_uuid(value: Uuid) -> Self {
        Self {
            value,
            _marker: std::marker::PhantomData,
        }
    }

    /// Parse from its canonical textual form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self::from_uuid)
    }

    /// The raw 16 bytes, used by the shard router for CRC32 hashing.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.value.as_bytes()
    }

    /// The underlying `Uuid`.
    pub fn as_uuid(&self) -> Uuid {
        self.value
    }
}

impl<Kind> Clone for Id<Kind> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<Kind> Copy for Id<Kind> {}
impl<Kind> PartialEq for Id<Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}
impl<Kind> Eq for Id<Kind> {}
impl<Kind> std::hash::Hash for Id<Kind> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}
impl<Kind> fmt::Debug for Id<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
impl<Kind> fmt::Display for Id<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
impl<Kind> From<Uuid> for Id<Kind> {
    fn from(value: Uuid) -> Self {
        Self::from_uuid(value)
    }
}

/// Marker types naming each identifier kind in §3.
pub mod kinds {
    #[derive(Debug)] pub struct User;
    #[derive(Debug)] pub struct Cooperative;
    #[derive(Debug)] pub struct Project;
    #[derive(Debug)] pub struct Investment;
    #[derive(Debug)] pub struct EscrowAccount;
    #[derive(Debug)] pub struct Disbursement;
    #[derive(Debug)] pub struct FundUsage;
    #[derive(Debug)] pub struct ProfitCalculation;
    #[derive(Debug)] pub struct Distribution;
    #[derive(Debug)] pub struct InvestorShare;
    #[derive(Debug)] pub struct Refund;
    #[derive(Debug)] pub struct InvestorRefund;
    #[derive(Debug)] pub struct AuditEntry;
    #[derive(Debug)] pub struct Transaction;
}

/// Identifier of a platform user (investor or business owner).
pub type UserId = Id<kinds::User>;
/// Identifier of a cooperative.
pub type CooperativeId = Id<kinds::Cooperative>;
/// Identifier of a business project.
pub type ProjectId = Id<kinds::Project>;
/// Identifier of an investment.
pub type InvestmentId = Id<kinds::Investment>;
/// Identifier of an escrow account.
pub type EscrowAccountId = Id<kinds::EscrowAccount>;
/// Identifier of a fund disbursement.
pub type DisbursementId = Id<kinds::Disbursement>;
/// Identifier of a fund usage entry.
pub type FundUsageId = Id<kinds::FundUsage>;
/// Identifier of a profit calculation.
pub type ProfitCalculationId = Id<kinds::ProfitCalculation>;
/// Identifier of a profit distribution.
pub type DistributionId = Id<kinds::Distribution>;
/// Identifier of one investor's profit share row.
pub type InvestorShareId = Id<kinds::InvestorShare>;
/// Identifier of a project-level refund.
pub type RefundId = Id<kinds::Refund>;
/// Identifier of one investor's refund row.
pub type InvestorRefundId = Id<kinds::InvestorRefund>;
/// Identifier of an audit entry.
pub type AuditEntryId = Id<kinds::AuditEntry>;
/// Identifier of a coordinator transaction.
pub type TransactionId = Id<kinds::Transaction>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_text() {
        let id: ProjectId = Id::new_v4();
        let parsed = ProjectId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn bytes_are_stable_across_clones() {
        let id: ProjectId = Id::new_v4();
        let copy = id;
        assert_eq!(id.as_bytes(), copy.as_bytes());
    }
}
