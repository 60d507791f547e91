//! `Coordinator::execute`: the one entry point spec §4.2 and §6 describe.
//!
//! Grounded on the teacher's `protocol_core::sharding::ShardCoordinator::
//! execute_cross_shard_payment` (prepare-all-then-commit-all shape, and its
//! `"INCONSISTENT STATE"` log line on partial commit failure) and
//! `services::clearing_engine::atomic::controller::AtomicController`
//! (per-call registry of in-flight work guarded by a lock). Unlike the
//! teacher's prepare/commit split, this coordinator has no prepare phase —
//! the reference Postgres substrate gives us one-phase commit only, so we
//! report partial failure loudly rather than simulate a phase we can't
//! actually provide.

use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::registry::TransactionRegistry;
use futures_util::future::BoxFuture;
use ledger_model::sql::{bind_values, pg_row_to_generic, SqlValue};
use ledger_model::Row;
use shard_router::{ShardIndex, ShardRouter};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

tokio::task_local! {
    static IN_COORDINATOR_CALL: ();
}

/// The deadline and cancellation source for one `Coordinator::execute` call
/// (spec §5: "every suspension point carries a cancellation context with
/// the request's deadline").
#[derive(Clone)]
pub struct ExecutionContext {
    deadline: Instant,
    cancellation: CancellationToken,
    transaction_id: ledger_model::TransactionId,
}

impl ExecutionContext {
    /// A fresh context with the given timeout and a new, un-cancelled token.
    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancellation: CancellationToken::new(),
            transaction_id: ledger_model::TransactionId::new_v7(),
        }
    }

    /// The cancellation token backing this context, clonable so a caller
    /// elsewhere (e.g. the external transport layer on client disconnect)
    /// can cancel the in-flight operation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// This call's transaction id — minted once per `execute` call so a
    /// `PartiallyCommitted` failure and the audit row it produces can both
    /// be traced back to the same coordinator invocation.
    pub fn transaction_id(&self) -> ledger_model::TransactionId {
        self.transaction_id
    }
}

/// Handle passed into the closure given to `Coordinator::execute`. Forwards
/// every query/exec through the per-shard transaction cached for the
/// lifetime of the call (spec §4.2 step 3).
pub struct TxHandle<'a> {
    registry: &'a TransactionRegistry,
}

impl<'a> TxHandle<'a> {
    /// Execute a mutating statement against the cached transaction for
    /// `shard`, opening one on first touch.
    #[instrument(skip(self, args))]
    pub async fn exec_on(&self, shard: ShardIndex, stmt: &str, args: &[SqlValue]) -> Result<u64> {
        let mut handles = self.registry.touch(shard).await?;
        let tx = handles
            .get_mut(&shard)
            .expect("touch() guarantees a transaction is present for `shard`");
        let query = bind_values(sqlx::query(stmt), args);
        query
            .execute(&mut **tx)
            .await
            .map(|done| done.rows_affected())
            .map_err(|e| Error::Core(ledger_model::Error::Transient(format!("shard {shard}: {e}"))))
    }

    /// Query against the cached transaction for `shard`.
    #[instrument(skip(self, args))]
    pub async fn query_on(&self, shard: ShardIndex, stmt: &str, args: &[SqlValue]) -> Result<Vec<Row>> {
        let mut handles = self.registry.touch(shard).await?;
        let tx = handles
            .get_mut(&shard)
            .expect("touch() guarantees a transaction is present for `shard`");
        let query = bind_values(sqlx::query(stmt), args);
        query
            .fetch_all(&mut **tx)
            .await
            .map(|rows| rows.into_iter().map(pg_row_to_generic).collect())
            .map_err(|e| Error::Core(ledger_model::Error::Transient(format!("shard {shard}: {e}"))))
    }

    /// Shards touched so far in this call, for the caller's own audit rows.
    pub async fn touched_shards(&self) -> Vec<ShardIndex> {
        self.registry.touched_shards().await
    }
}

/// A boxed, `'static`-free future so `Coordinator::execute`'s closure can
/// borrow the `TxHandle` it's given without `async` closures (not yet
/// stable) getting in the way — the same shape `diesel_async` and `sqlx`
/// itself use for transaction callbacks.
pub type OperationResult<'a, T> = BoxFuture<'a, std::result::Result<T, Error>>;

/// The distributed transaction coordinator (spec §4.2).
pub struct Coordinator {
    router: Arc<ShardRouter>,
    config: CoordinatorConfig,
    metrics: Metrics,
}

impl Coordinator {
    /// Construct a coordinator over `router` with default tuning.
    pub fn new(router: Arc<ShardRouter>) -> Self {
        Self::with_config(router, CoordinatorConfig::default())
    }

    /// Construct a coordinator with explicit tuning.
    pub fn with_config(router: Arc<ShardRouter>, config: CoordinatorConfig) -> Self {
        Self {
            router,
            config,
            metrics: Metrics::new().expect("failed to initialize coordinator metrics"),
        }
    }

    /// A fresh execution context using this coordinator's default timeout.
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::with_timeout(self.config.default_timeout())
    }

    /// Coordinator metrics, for exposition by the embedding binary.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Run `f` inside a coordinator-managed set of per-shard transactions
    /// (spec §4.2, §6). `f` receives a [`TxHandle`] forwarding every call
    /// to the transaction opened lazily for that shard; on success every
    /// touched shard is committed in ascending shard-index order, on
    /// failure every touched shard is rolled back.
    ///
    /// Nested calls (an `execute` invoked from inside another `execute`'s
    /// `f`, within the same async task) are rejected with
    /// [`ledger_model::Error::NestedTransaction`] — spec §4.2 step 6 and the
    /// Design Notes in §9 both require reentry to be detected, not merely
    /// discouraged by convention.
    pub async fn execute<T, F>(&self, ctx: &ExecutionContext, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'r> FnOnce(&'r TxHandle<'r>) -> OperationResult<'r, T> + Send,
    {
        if IN_COORDINATOR_CALL.try_with(|_| ()).is_ok() {
            self.metrics.record_outcome("nested_rejected");
            return Err(Error::Core(ledger_model::Error::NestedTransaction));
        }

        IN_COORDINATOR_CALL
            .scope((), self.execute_inner(ctx, f))
            .await
    }

    async fn execute_inner<T, F>(&self, ctx: &ExecutionContext, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'r> FnOnce(&'r TxHandle<'r>) -> OperationResult<'r, T> + Send,
    {
        let registry = TransactionRegistry::new(self.router.clone());
        let handle = TxHandle { registry: &registry };

        let body = async {
            tokio::select! {
                biased;
                _ = ctx.cancellation.cancelled() => {
                    Err(Error::Core(ledger_model::Error::Cancelled("context cancelled".to_string())))
                }
                result = f(&handle) => result,
            }
        };

        match tokio::time::timeout_at(ctx.deadline, body).await {
            Err(_elapsed) => {
                self.rollback_all(&registry).await;
                self.metrics.record_outcome("timeout");
                Err(Error::Core(ledger_model::Error::Timeout(
                    "coordinator execution window elapsed".to_string(),
                )))
            }
            Ok(Err(Error::Core(ledger_model::Error::Cancelled(reason)))) => {
                self.rollback_all(&registry).await;
                self.metrics.record_outcome("cancelled");
                Err(Error::Core(ledger_model::Error::Cancelled(reason)))
            }
            Ok(Err(e)) => {
                self.rollback_all(&registry).await;
                self.metrics.record_outcome("rolled_back");
                Err(e)
            }
            Ok(Ok(value)) => match self.commit_all(&registry).await {
                CommitOutcome::AllCommitted => {
                    self.metrics.record_outcome("committed");
                    Ok(value)
                }
                CommitOutcome::Partial { committed, failed } => {
                    let shards: Vec<ShardIndex> = committed
                        .iter()
                        .copied()
                        .chain(failed.iter().map(|(shard, _)| *shard))
                        .collect();
                    error!(
                        target: "tx_coordinator::partial_commit",
                        severity = "CRITICAL",
                        transaction_id = %ctx.transaction_id,
                        committed = ?committed,
                        failed = ?failed.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
                        "coordinator transaction partially committed across shards {:?}",
                        shards
                    );
                    self.metrics.record_outcome("partially_committed");
                    Err(Error::Core(ledger_model::Error::PartiallyCommitted(ledger_model::PartialCommitDetail {
                        transaction_id: ctx.transaction_id,
                        committed_shards: committed,
                        failed_shards: failed,
                    })))
                }
            },
        }
    }

    async fn rollback_all(&self, registry: &TransactionRegistry) {
        for (shard, tx) in registry.drain_ordered().await {
            if let Err(e) = tx.rollback().await {
                warn!(shard, error = %e, "rollback failed (original error takes precedence)");
            }
        }
    }

    async fn commit_all(&self, registry: &TransactionRegistry) -> CommitOutcome {
        let mut committed = Vec::new();
        let mut failed = Vec::new();
        for (shard, tx) in registry.drain_ordered().await {
            match tx.commit().await {
                Ok(()) => {
                    info!(shard, "shard transaction committed");
                    committed.push(shard);
                }
                Err(e) => {
                    failed.push((shard, e.to_string()));
                }
            }
        }
        if failed.is_empty() {
            CommitOutcome::AllCommitted
        } else {
            CommitOutcome::Partial { committed, failed }
        }
    }
}

enum CommitOutcome {
    AllCommitted,
    Partial {
        committed: Vec<ShardIndex>,
        failed: Vec<(ShardIndex, String)>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nested_execute_is_rejected() {
        // A router with zero shards never actually opens a connection, so
        // this test exercises only the reentry guard, not real commits.
        let router = Arc::new(ShardRouter::from_pools(Vec::new(), shard_router::RouterConfig {
            shard_urls: Vec::new(),
            idempotency_shard: 0,
            pool: shard_router::PoolConfig::default(),
            retry: shard_router::RetryPolicy::default(),
        }));
        let coordinator = Coordinator::new(router);
        let ctx = coordinator.context();

        let outer_coordinator = &coordinator;
        let outer_ctx = &ctx;
        let result = coordinator
            .execute(&ctx, move |_tx| {
                Box::pin(async move {
                    let inner = outer_coordinator.execute(outer_ctx, |_tx| {
                        Box::pin(async { Ok::<_, Error>(()) })
                    });
                    inner.await
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(Error::Core(ledger_model::Error::NestedTransaction))
        ));
    }
}
