//! Coordinator error type.

use thiserror::Error;

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coordinator errors: the shared taxonomy plus the underlying router error.
#[derive(Error, Debug)]
pub enum Error {
    /// A shared-taxonomy error, including `Timeout`, `Cancelled`,
    /// `PartiallyCommitted`, and `NestedTransaction`.
    #[error(transparent)]
    Core(#[from] ledger_model::Error),

    /// A shard-router failure surfaced while forwarding a call.
    #[error(transparent)]
    Router(#[from] shard_router::Error),
}
