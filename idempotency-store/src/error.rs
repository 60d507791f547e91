//! Idempotency-store error type, wrapping the shared taxonomy.

use thiserror::Error;

/// Result type for idempotency-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Idempotency-store errors: the shared taxonomy plus the router failure
/// that can surface while reading or writing the `idempotency_keys` table.
#[derive(Error, Debug)]
pub enum Error {
    /// A shared-taxonomy error, including `BadIdempotencyKey` and
    /// `ConcurrentIdempotentRequest`.
    #[error(transparent)]
    Core(#[from] ledger_model::Error),

    /// A shard-router failure surfaced while reading or writing the
    /// dedicated idempotency shard.
    #[error(transparent)]
    Router(#[from] shard_router::Error),

    /// Canonical-JSON hashing failed (malformed request body).
    #[error("failed to hash request body: {0}")]
    Hashing(#[from] serde_json::Error),
}
