//! Per-call transaction registry: caches the first transaction opened on
//! each shard for the lifetime of one `Coordinator::execute` call, guarded
//! by a reader-writer lock so concurrent forwarding reads don't contend
//! with the (rare) first-touch insert. Modeled on the teacher's
//! `services::clearing_engine::atomic::controller::AtomicController`,
//! which tracks one record per in-flight operation, narrowed here to one
//! record per shard per coordinator call.

use crate::error::Result;
use shard_router::{ShardIndex, ShardRouter};
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds at most one open transaction per shard, opened lazily on first
/// touch. Never shared beyond the `Coordinator::execute` call that owns it —
/// `Coordinator` drops it (and with it every cached `Transaction`) before
/// returning, so a handle can never leak past the scope that created it.
pub(crate) struct TransactionRegistry {
    router: Arc<ShardRouter>,
    handles: RwLock<HashMap<ShardIndex, Transaction<'static, Postgres>>>,
}

impl TransactionRegistry {
    pub(crate) fn new(router: Arc<ShardRouter>) -> Self {
        Self {
            router,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Borrow the cached transaction for `shard`, opening one on first
    /// touch. The returned lock guard must be held for as long as the
    /// caller needs the transaction; dropping it releases the registry for
    /// the next forward.
    pub(crate) async fn touch(
        &self,
        shard: ShardIndex,
    ) -> Result<tokio::sync::RwLockWriteGuard<'_, HashMap<ShardIndex, Transaction<'static, Postgres>>>> {
        let mut handles = self.handles.write().await;
        if !handles.contains_key(&shard) {
            let tx = self.router.begin_on(shard).await?;
            handles.insert(shard, tx);
        }
        Ok(handles)
    }

    /// Drain every cached transaction, in ascending shard-index order, so
    /// the caller can commit or roll them back deterministically.
    pub(crate) async fn drain_ordered(&self) -> Vec<(ShardIndex, Transaction<'static, Postgres>)> {
        let mut handles = self.handles.write().await;
        let mut drained: Vec<_> = handles.drain().collect();
        drained.sort_by_key(|(shard, _)| *shard);
        drained
    }

    /// Shards touched so far, for diagnostics (e.g. the `PartiallyCommitted`
    /// audit row names every shard involved).
    pub(crate) async fn touched_shards(&self) -> Vec<ShardIndex> {
        let handles = self.handles.read().await;
        let mut shards: Vec<_> = handles.keys().copied().collect();
        shards.sort_unstable();
        shards
    }
}
