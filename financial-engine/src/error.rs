//! Financial-engine error type, wrapping every layer beneath it.

use thiserror::Error;

/// Result type for financial-engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Financial-engine errors: the shared taxonomy plus failures surfaced from
/// the router, coordinator, idempotency store, and audit writer it composes.
#[derive(Error, Debug)]
pub enum Error {
    /// A shared-taxonomy error (validation, policy, state, infrastructure).
    #[error(transparent)]
    Core(#[from] ledger_model::Error),

    /// A shard-router failure.
    #[error(transparent)]
    Router(#[from] shard_router::Error),

    /// A coordinator failure.
    #[error(transparent)]
    Coordinator(#[from] tx_coordinator::Error),

    /// An idempotency-store failure.
    #[error(transparent)]
    Idempotency(#[from] idempotency_store::Error),

    /// An audit-writer failure.
    #[error(transparent)]
    Audit(#[from] audit_log::Error),
}

impl Error {
    /// The stable kind label persisted by the idempotency store on a failed
    /// call, falling back to a generic label for infrastructure errors that
    /// don't originate in the shared taxonomy.
    pub fn kind(&self) -> String {
        match self {
            Error::Core(e) => e.kind().to_string(),
            Error::Router(shard_router::Error::Core(e)) => e.kind().to_string(),
            Error::Router(shard_router::Error::Database(_)) => "database".to_string(),
            Error::Coordinator(tx_coordinator::Error::Core(e)) => e.kind().to_string(),
            Error::Coordinator(tx_coordinator::Error::Router(_)) => "shard_unavailable".to_string(),
            Error::Idempotency(idempotency_store::Error::Core(e)) => e.kind().to_string(),
            Error::Idempotency(idempotency_store::Error::Router(_)) => "shard_unavailable".to_string(),
            Error::Idempotency(idempotency_store::Error::Hashing(_)) => "bad_request_body".to_string(),
            Error::Audit(_) => "audit_failure".to_string(),
        }
    }
}
