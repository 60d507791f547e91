//! Shared error taxonomy for the crowdfunding core.
//!
//! Every crate in the workspace propagates this enum unchanged (wrapping it
//! with `#[from]` in its own thin error type where it needs infrastructure
//! variants of its own) so that a validation or policy error raised deep in
//! `financial-engine` surfaces to the caller with the same `kind` it started
//! with, per the "kind, not type name" rule.

use crate::ids::TransactionId;
use thiserror::Error;

/// Result type used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured detail for a [`Error::PartiallyCommitted`] failure: which
/// shards committed, which didn't, and the coordinator transaction id the
/// CRITICAL audit row should be filed under (spec §4.2 step 4's
/// reconciliation requirement).
#[derive(Debug, Clone, PartialEq)]
pub struct PartialCommitDetail {
    /// The coordinator call this failure happened under.
    pub transaction_id: TransactionId,
    /// Shards whose transaction committed successfully.
    pub committed_shards: Vec<usize>,
    /// Shards whose commit failed, alongside the error each one reported.
    pub failed_shards: Vec<(usize, String)>,
}

impl std::fmt::Display for PartialCommitDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "transaction {} committed shards {:?}, failed to commit shards {:?}",
            self.transaction_id, self.committed_shards, self.failed_shards
        )
    }
}

/// The full error taxonomy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // -- Validation -----------------------------------------------------
    /// A 128-bit identifier could not be parsed or routed.
    #[error("bad key: {0}")]
    BadKey(String),

    /// An idempotency key did not match the required grammar.
    #[error("bad idempotency key: {0}")]
    BadIdempotencyKey(String),

    /// An amount fell outside the limits that apply to it.
    #[error("amount out of range: {0}")]
    AmountOutOfRange(String),

    /// Profit-sharing ratios did not sum to exactly 10,000 basis points.
    #[error("ratios do not sum to one: {0}")]
    RatiosDoNotSumToOne(String),

    // -- Policy -----------------------------------------------------------
    /// The actor is not a member of the cooperative that owns the entity.
    #[error("not a cooperative member: {0}")]
    NotCooperativeMember(String),

    /// A cooperative- or project-level policy rejected the request.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// A configured limit (single transaction, concentration, ...) was exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// The investment would push `current_funding` past `funding_goal`.
    #[error("funding goal exceeded: {0}")]
    FundingGoalExceeded(String),

    /// The escrow balance attributable to the project cannot cover the request.
    #[error("insufficient escrow: {0}")]
    InsufficientEscrow(String),

    // -- State ------------------------------------------------------------
    /// The requested state transition is not legal from the entity's current state.
    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    /// The entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The entity has already reached a terminal state.
    #[error("already finalized: {0}")]
    AlreadyFinalized(String),

    /// An idempotent request is already in flight and did not finish within the wait window.
    #[error("concurrent idempotent request: {0}")]
    ConcurrentIdempotentRequest(String),

    // -- Infrastructure -----------------------------------------------------
    /// A transient infrastructure failure; safe to retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// The addressed shard has no live connection.
    #[error("shard unavailable: {0}")]
    ShardUnavailable(String),

    /// The operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The operation was cancelled by its caller.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Some shards committed and others did not; this is an operational incident.
    #[error("partially committed: {0}")]
    PartiallyCommitted(PartialCommitDetail),

    // -- Nested -------------------------------------------------------------
    /// `Coordinator::execute` was called while already inside another `execute`.
    #[error("nested transaction")]
    NestedTransaction,
}

impl Error {
    /// Whether the router's bounded retry loop should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    /// A stable, lowercase label for this error's variant, independent of its
    /// message payload — what `idempotency-store` persists as `error_kind`
    /// when caching a failed call's outcome (spec §4.3 step 6).
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadKey(_) => "bad_key",
            Error::BadIdempotencyKey(_) => "bad_idempotency_key",
            Error::AmountOutOfRange(_) => "amount_out_of_range",
            Error::RatiosDoNotSumToOne(_) => "ratios_do_not_sum_to_one",
            Error::NotCooperativeMember(_) => "not_cooperative_member",
            Error::PolicyViolation(_) => "policy_violation",
            Error::LimitExceeded(_) => "limit_exceeded",
            Error::FundingGoalExceeded(_) => "funding_goal_exceeded",
            Error::InsufficientEscrow(_) => "insufficient_escrow",
            Error::IllegalTransition(_) => "illegal_transition",
            Error::NotFound(_) => "not_found",
            Error::AlreadyFinalized(_) => "already_finalized",
            Error::ConcurrentIdempotentRequest(_) => "concurrent_idempotent_request",
            Error::Transient(_) => "transient",
            Error::ShardUnavailable(_) => "shard_unavailable",
            Error::Timeout(_) => "timeout",
            Error::Cancelled(_) => "cancelled",
            Error::PartiallyCommitted(_) => "partially_committed",
            Error::NestedTransaction => "nested_transaction",
        }
    }
}
