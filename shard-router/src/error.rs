//! Router-local error type, wrapping the shared taxonomy.

use thiserror::Error;

/// Result type for router operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Router errors: the shared taxonomy plus the one infrastructure variant
/// (`sqlx::Error`) that is specific to this crate's substrate.
#[derive(Error, Debug)]
pub enum Error {
    /// A shared-taxonomy error (validation, policy, state, infra, nested).
    #[error(transparent)]
    Core(#[from] ledger_model::Error),

    /// A raw `sqlx` failure that hasn't been classified yet.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Classify a raw `sqlx::Error` into the shared taxonomy's `Transient`
    /// kind when it looks retryable (connection drop, pool timeout), or
    /// `ShardUnavailable` when the shard plainly has no connection.
    pub fn classify_sqlx(shard: usize, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                Error::Core(ledger_model::Error::Transient(format!(
                    "shard {shard}: {err}"
                )))
            }
            sqlx::Error::PoolClosed => Error::Core(ledger_model::Error::ShardUnavailable(
                format!("shard {shard}: pool closed"),
            )),
            _ => Error::Database(err),
        }
    }
}
