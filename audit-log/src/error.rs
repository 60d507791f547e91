//! Audit-writer error type, wrapping the shared taxonomy.

use thiserror::Error;

/// Result type for audit-writer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Audit-writer errors: the shared taxonomy plus the router/coordinator
/// failures that can surface while writing a row.
#[derive(Error, Debug)]
pub enum Error {
    /// A shared-taxonomy error.
    #[error(transparent)]
    Core(#[from] ledger_model::Error),

    /// A shard-router failure (standalone, out-of-transaction writes).
    #[error(transparent)]
    Router(#[from] shard_router::Error),

    /// A coordinator failure (in-transaction writes).
    #[error(transparent)]
    Coordinator(#[from] tx_coordinator::Error),
}
