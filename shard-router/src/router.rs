//! The shard router (spec §4.1): deterministic routing over a fixed array
//! of Postgres partitions, bounded-retry single-shard exec/query, and a
//! parallel fanout operation. Grounded on `protocol_core::sharding::
//! ShardCoordinator` (routing + per-shard `sqlx::query` calls) and
//! `services::clearing_engine::database::create_pool` (pool construction),
//! generalized from payment corridors to the CRC32 routing spec §4.1 pins.

use crate::config::RouterConfig;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use ledger_model::sql::{bind_values, pg_row_to_generic, SqlValue};
use ledger_model::Row;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Stable ordinal shard index, `0..N-1`.
pub type ShardIndex = usize;

/// Pure routing function: CRC32 of a 16-byte identifier modulo `shard_count`
/// (spec §4.1). Factored out of [`ShardRouter::route`] so it can be property
/// tested without standing up real database pools, and so any crate that
/// needs to predict a shard ahead of a call (e.g. `financial-engine` when
/// logging which shard a retried operation targeted) can call it directly.
pub fn route_id(id: &[u8; 16], shard_count: usize) -> ShardIndex {
    (crc32fast::hash(id) as usize) % shard_count
}

/// Per-shard health outcome from a non-blocking ping.
#[derive(Debug, Clone)]
pub struct FanoutResult<T> {
    /// Results keyed by shard index, for shards that succeeded.
    pub ok: BTreeMap<ShardIndex, T>,
    /// Errors keyed by shard index, for shards that failed.
    pub errors: BTreeMap<ShardIndex, Error>,
}

impl<T> FanoutResult<T> {
    /// Whether every shard succeeded.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The router itself. Immutable after construction (spec §4.1); the only
/// interior mutability is inside the `sqlx::PgPool`s, which are read-mostly
/// connection pools.
pub struct ShardRouter {
    pools: Vec<PgPool>,
    config: RouterConfig,
    metrics: Metrics,
}

impl ShardRouter {
    /// Connect to every shard in `config.shard_urls`, applying the pool
    /// tuning in `config.pool` to each.
    #[instrument(skip(config))]
    pub async fn connect(config: RouterConfig) -> Result<Self> {
        let mut pools = Vec::with_capacity(config.shard_count());
        for (idx, url) in config.shard_urls.iter().enumerate() {
            info!(shard = idx, "connecting to shard");
            let pool = PgPoolOptions::new()
                .max_connections(config.pool.max_connections)
                .min_connections(config.pool.min_connections)
                .max_lifetime(Duration::from_secs(config.pool.max_lifetime_secs))
                .connect(url)
                .await
                .map_err(|e| Error::classify_sqlx(idx, e))?;
            pools.push(pool);
        }

        Ok(Self {
            pools,
            config,
            metrics: Metrics::new().expect("failed to initialize router metrics"),
        })
    }

    /// Build a router directly from already-open pools (used by tests and
    /// by callers that manage pool lifecycle themselves).
    pub fn from_pools(pools: Vec<PgPool>, config: RouterConfig) -> Self {
        Self {
            pools,
            config,
            metrics: Metrics::new().expect("failed to initialize router metrics"),
        }
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.pools.len()
    }

    /// The shard `idempotency_keys`/`idempotency_sequence` lives on.
    pub fn idempotency_shard(&self) -> ShardIndex {
        self.config.idempotency_shard
    }

    /// Router metrics, for exposition by the embedding binary.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Deterministic, uniform routing: CRC32 of the 16-byte identifier
    /// modulo the shard count (spec §4.1, wire-level stable per spec §6 —
    /// changing this function is a breaking change).
    pub fn route(&self, id: &[u8; 16]) -> ShardIndex {
        route_id(id, self.config.shard_urls.len())
    }

    fn pool(&self, shard: ShardIndex) -> Result<&PgPool> {
        self.pools
            .get(shard)
            .ok_or_else(|| Error::Core(ledger_model::Error::ShardUnavailable(format!("shard {shard}"))))
    }

    /// Single-shard mutation with bounded retry on transient errors
    /// (default 3 attempts, linear backoff `attempt * 100ms`).
    #[instrument(skip(self, args))]
    pub async fn exec_on(&self, shard: ShardIndex, stmt: &str, args: &[SqlValue]) -> Result<u64> {
        let pool = self.pool(shard)?;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let query = bind_values(sqlx::query(stmt), args);
            match query.execute(pool).await {
                Ok(done) => {
                    self.metrics.record_attempt(shard, "ok");
                    return Ok(done.rows_affected());
                }
                Err(e) => {
                    let classified = Error::classify_sqlx(shard, e);
                    if attempt >= self.config.retry.max_attempts || !is_retryable(&classified) {
                        self.metrics.record_attempt(shard, "error");
                        return Err(classified);
                    }
                    self.metrics.record_retry(shard);
                    warn!(shard, attempt, "transient shard error, retrying");
                    tokio::time::sleep(Duration::from_millis(
                        self.config.retry.backoff_step_ms * attempt as u64,
                    ))
                    .await;
                }
            }
        }
    }

    /// Single-shard query with the same bounded retry policy as `exec_on`.
    #[instrument(skip(self, args))]
    pub async fn query_on(&self, shard: ShardIndex, stmt: &str, args: &[SqlValue]) -> Result<Vec<Row>> {
        let pool = self.pool(shard)?;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let query = bind_values(sqlx::query(stmt), args);
            match query.fetch_all(pool).await {
                Ok(rows) => {
                    self.metrics.record_attempt(shard, "ok");
                    return Ok(rows.into_iter().map(pg_row_to_generic).collect());
                }
                Err(e) => {
                    let classified = Error::classify_sqlx(shard, e);
                    if attempt >= self.config.retry.max_attempts || !is_retryable(&classified) {
                        self.metrics.record_attempt(shard, "error");
                        return Err(classified);
                    }
                    self.metrics.record_retry(shard);
                    warn!(shard, attempt, "transient shard error, retrying");
                    tokio::time::sleep(Duration::from_millis(
                        self.config.retry.backoff_step_ms * attempt as u64,
                    ))
                    .await;
                }
            }
        }
    }

    /// Open a read-committed transaction on `shard`. The coordinator
    /// (`tx-coordinator`) is the only intended caller of this method
    /// outside of tests — direct callers bypass idempotency/audit wiring.
    pub async fn begin_on(&self, shard: ShardIndex) -> Result<Transaction<'static, Postgres>> {
        let pool = self.pool(shard)?;
        pool.begin().await.map_err(|e| Error::classify_sqlx(shard, e))
    }

    /// Fan a statement out to every shard in parallel, aggregating
    /// successes and failures rather than failing the whole call on one
    /// shard's error.
    #[instrument(skip(self, args))]
    pub async fn fanout(&self, stmt: &str, args: &[SqlValue]) -> FanoutResult<Vec<Row>> {
        let futures = (0..self.pools.len()).map(|shard| async move {
            (shard, self.query_on(shard, stmt, args).await)
        });
        let results = futures_util::future::join_all(futures).await;

        let mut ok = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for (shard, result) in results {
            match result {
                Ok(rows) => {
                    ok.insert(shard, rows);
                }
                Err(e) => {
                    errors.insert(shard, e);
                }
            }
        }
        FanoutResult { ok, errors }
    }

    /// Non-blocking ping of every shard (`SELECT 1`), bounded by a short
    /// per-shard timeout so one dead shard cannot stall the whole call.
    pub async fn health(&self) -> BTreeMap<ShardIndex, bool> {
        let futures = (0..self.pools.len()).map(|shard| async move {
            let pool = &self.pools[shard];
            let ok = tokio::time::timeout(Duration::from_millis(500), sqlx::query("SELECT 1").execute(pool))
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false);
            (shard, ok)
        });
        let results = futures_util::future::join_all(futures).await;
        for (shard, ok) in &results {
            self.metrics.record_health(*shard, *ok);
        }
        results.into_iter().collect()
    }

    /// Close every shard's pool, waiting for in-flight work to drain.
    pub async fn close(&self) {
        for pool in &self.pools {
            pool.close().await;
        }
    }
}

fn is_retryable(err: &Error) -> bool {
    match err {
        Error::Core(core) => core.is_retryable(),
        Error::Database(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ids(n: usize) -> Vec<[u8; 16]> {
        (0..n)
            .map(|i| {
                let mut bytes = [0u8; 16];
                bytes[..8].copy_from_slice(&(i as u64).to_le_bytes());
                bytes[8..].copy_from_slice(&(i as u64 * 2654435761).to_le_bytes());
                bytes
            })
            .collect()
    }

    fn test_router(shard_count: usize) -> ShardRouter {
        ShardRouter {
            pools: Vec::new(),
            config: RouterConfig {
                shard_urls: vec!["postgres://unused".to_string(); shard_count],
                idempotency_shard: 0,
                pool: crate::config::PoolConfig::default(),
                retry: crate::config::RetryPolicy::default(),
            },
            metrics: Metrics::new().unwrap(),
        }
    }

    #[test]
    fn routing_is_deterministic() {
        let router = test_router(4);
        for id in sample_ids(1000) {
            assert_eq!(router.route(&id), router.route(&id));
        }
    }

    #[test]
    fn routing_distributes_within_tolerance() {
        let n = 4usize;
        let router = test_router(n);
        let mut counts = vec![0usize; n];
        let sample_size = 100_000;
        for i in 0..sample_size {
            let mut bytes = [0u8; 16];
            bytes[..8].copy_from_slice(&(i as u64).to_le_bytes());
            bytes[8..].copy_from_slice(&(i as u64).wrapping_mul(2654435761).to_le_bytes());
            counts[router.route(&bytes)] += 1;
        }
        let ideal = sample_size as f64 / n as f64;
        for count in counts {
            let deviation = (count as f64 - ideal).abs() / ideal;
            assert!(deviation < 0.05, "deviation {deviation} exceeds 5% tolerance");
        }
    }
}
