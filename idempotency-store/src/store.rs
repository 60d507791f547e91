//! `IdempotencyStore::check_or_begin` / `finalize` / `sweep` — the
//! algorithm in spec §4.3 steps 1-7, against the `idempotency_keys` table
//! on the router's dedicated idempotency shard (spec §6).
//!
//! Grounded on the teacher's `ledger_core::actor::LedgerActor` for the
//! "background timer loop drives a maintenance pass" shape (reused here for
//! `sweep`), generalized from its batch-commit timer to TTL expiry.

use crate::config::IdempotencyConfig;
use crate::error::{Error, Result};
use crate::hash::canonical_json_hash;
use crate::key::IdempotencyKey;
use crate::metrics::Metrics;
use chrono::{Duration as ChronoDuration, Utc};
use ledger_model::UserId;
use rand::RngCore;
use shard_router::ShardRouter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

const LOOKUP_BY_KEY_SQL: &str = "SELECT status, response_body, error_kind, expires_at \
     FROM idempotency_keys WHERE user_id = $1 AND endpoint = $2 AND key = $3";

const LOOKUP_COMPLETED_BY_HASH_SQL: &str = "SELECT response_body FROM idempotency_keys \
     WHERE user_id = $1 AND endpoint = $2 AND request_hash = $3 \
     AND status = 'completed' AND expires_at > $4 LIMIT 1";

const INSERT_PENDING_SQL: &str = "INSERT INTO idempotency_keys \
     (key, user_id, endpoint, request_hash, status, created_at, expires_at) \
     VALUES ($1, $2, $3, $4, 'pending', $5, $6) \
     ON CONFLICT (user_id, endpoint, key) DO UPDATE SET \
         request_hash = EXCLUDED.request_hash, status = 'pending', \
         created_at = EXCLUDED.created_at, expires_at = EXCLUDED.expires_at, \
         response_body = NULL, error_kind = NULL";

const COMPLETE_SQL: &str = "UPDATE idempotency_keys SET status = 'completed', response_body = $1 \
     WHERE user_id = $2 AND endpoint = $3 AND key = $4";

const FAIL_SQL: &str = "UPDATE idempotency_keys SET status = 'failed', error_kind = $1 \
     WHERE user_id = $2 AND endpoint = $3 AND key = $4";

const SWEEP_SQL: &str = "DELETE FROM idempotency_keys WHERE expires_at <= $1";

const NEXT_SEQUENCE_SQL: &str = "SELECT nextval('idempotency_sequence') AS seq";

/// Whether a cached response came from `status = 'completed'` or
/// `status = 'failed'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The original call succeeded; `body` is its response.
    Completed,
    /// The original call failed; `body` carries the error kind as a
    /// JSON string (so the caller can decide how to re-surface it).
    Failed,
}

/// A cached response returned in place of re-running the operation.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// Whether the original call completed or failed.
    pub status: CompletionStatus,
    /// The cached response body (or error-kind marker, if `Failed`).
    pub body: serde_json::Value,
    /// Always `true` — every `CachedResponse` is by definition a replay.
    pub is_duplicate: bool,
}

/// Threaded through to `finalize` once the caller's operation has run.
#[derive(Debug, Clone)]
pub struct IdempotencyHandle {
    user_id: UserId,
    endpoint: String,
    key: Option<String>,
    request_hash: String,
}

impl IdempotencyHandle {
    /// The canonical-JSON request hash this handle was opened with.
    pub fn request_hash(&self) -> &str {
        &self.request_hash
    }

    /// Whether this call carries a client-supplied key (and therefore will
    /// be cached at all).
    pub fn is_keyed(&self) -> bool {
        self.key.is_some()
    }
}

/// The result of [`IdempotencyStore::check_or_begin`].
#[derive(Debug)]
pub enum Outcome {
    /// A prior call already completed (or failed); replay its response
    /// without running the operation again.
    Replay(CachedResponse),
    /// No cached response exists; run the operation, then call
    /// [`IdempotencyStore::finalize`] with this handle.
    Proceed(IdempotencyHandle),
}

/// The idempotency store (spec §4.3).
pub struct IdempotencyStore {
    router: Arc<ShardRouter>,
    config: IdempotencyConfig,
    metrics: Metrics,
}

impl IdempotencyStore {
    /// Construct a store over `router` with default tuning.
    pub fn new(router: Arc<ShardRouter>) -> Self {
        Self::with_config(router, IdempotencyConfig::default())
    }

    /// Construct a store with explicit tuning.
    pub fn with_config(router: Arc<ShardRouter>, config: IdempotencyConfig) -> Self {
        Self {
            router,
            config,
            metrics: Metrics::new().expect("failed to initialize idempotency-store metrics"),
        }
    }

    /// Store metrics, for exposition by the embedding binary.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Generate a server-side key for `table_name`, drawing its sequence
    /// block from the `idempotency_sequence` counter on the dedicated
    /// shard.
    pub async fn generate_key(&self, table_name: &str, rng: &mut dyn RngCore) -> Result<IdempotencyKey> {
        let shard = self.router.idempotency_shard();
        let rows = self.router.query_on(shard, NEXT_SEQUENCE_SQL, &[]).await?;
        let sequence: i64 = rows.first().and_then(|r| r.get::<i64>("seq")).unwrap_or(0);
        Ok(IdempotencyKey::generate(table_name, sequence as u32, Utc::now(), rng))
    }

    /// Steps 1-4 of spec §4.3: hash the request, look the key up, and
    /// either return a cached replay or begin a new `Pending` row.
    #[instrument(skip(self, request_body))]
    pub async fn check_or_begin(
        &self,
        user_id: UserId,
        endpoint: &str,
        key: Option<&str>,
        request_body: &serde_json::Value,
    ) -> Result<Outcome> {
        let request_hash = canonical_json_hash(request_body)?;

        let Some(raw_key) = key else {
            self.metrics.record("no_key");
            return Ok(Outcome::Proceed(IdempotencyHandle {
                user_id,
                endpoint: endpoint.to_string(),
                key: None,
                request_hash,
            }));
        };

        let parsed = IdempotencyKey::parse(raw_key).map_err(|e| {
            self.metrics.record("malformed_key");
            e
        })?;

        let shard = self.router.idempotency_shard();
        let key_args = [
            user_id.as_uuid().into(),
            endpoint.into(),
            parsed.as_str().into(),
        ];

        if let Some(row) = self.router.query_on(shard, LOOKUP_BY_KEY_SQL, &key_args).await?.into_iter().next() {
            let status: String = row.get("status").unwrap_or_default();
            match status.as_str() {
                "completed" => {
                    self.metrics.record("hit");
                    let body = row.get("response_body").unwrap_or(serde_json::Value::Null);
                    return Ok(Outcome::Replay(CachedResponse {
                        status: CompletionStatus::Completed,
                        body,
                        is_duplicate: true,
                    }));
                }
                "pending" => {
                    if let Some(cached) = self.wait_for_pending(shard, &key_args).await? {
                        self.metrics.record("hit_after_wait");
                        return Ok(Outcome::Replay(cached));
                    }
                    self.metrics.record("concurrent_timeout");
                    return Err(Error::Core(ledger_model::Error::ConcurrentIdempotentRequest(
                        format!("key {raw_key} still pending after wait window"),
                    )));
                }
                // Failed or Expired: treat as not-found and proceed (spec
                // §4.3 step 3).
                _ => {}
            }
        }

        // Same-content duplicate without an explicit matching key: collapse
        // onto the earlier call's response (spec §4.3 step 4).
        let dup_args = [
            user_id.as_uuid().into(),
            endpoint.into(),
            request_hash.clone().into(),
            Utc::now().into(),
        ];
        if let Some(row) = self
            .router
            .query_on(shard, LOOKUP_COMPLETED_BY_HASH_SQL, &dup_args)
            .await?
            .into_iter()
            .next()
        {
            self.metrics.record("hash_collision_hit");
            let body = row.get("response_body").unwrap_or(serde_json::Value::Null);
            return Ok(Outcome::Replay(CachedResponse {
                status: CompletionStatus::Completed,
                body,
                is_duplicate: true,
            }));
        }

        let now = Utc::now();
        let expires_at = now + ChronoDuration::hours(self.config.ttl_hours);
        let insert_args = [
            parsed.as_str().into(),
            user_id.as_uuid().into(),
            endpoint.into(),
            request_hash.clone().into(),
            now.into(),
            expires_at.into(),
        ];
        self.router.exec_on(shard, INSERT_PENDING_SQL, &insert_args).await?;
        self.metrics.record("proceed");

        Ok(Outcome::Proceed(IdempotencyHandle {
            user_id,
            endpoint: endpoint.to_string(),
            key: Some(parsed.as_str().to_string()),
            request_hash,
        }))
    }

    async fn wait_for_pending(
        &self,
        shard: shard_router::ShardIndex,
        key_args: &[ledger_model::sql::SqlValue],
    ) -> Result<Option<CachedResponse>> {
        for attempt in 1..=self.config.wait_retries {
            tokio::time::sleep(Duration::from_millis(self.config.wait_interval_ms)).await;
            let Some(row) = self.router.query_on(shard, LOOKUP_BY_KEY_SQL, key_args).await?.into_iter().next() else {
                return Ok(None);
            };
            let status: String = row.get("status").unwrap_or_default();
            if status == "completed" {
                let body = row.get("response_body").unwrap_or(serde_json::Value::Null);
                return Ok(Some(CachedResponse {
                    status: CompletionStatus::Completed,
                    body,
                    is_duplicate: true,
                }));
            }
            if status != "pending" {
                return Ok(None);
            }
            warn!(attempt, "idempotent request still pending, waiting");
        }
        Ok(None)
    }

    /// Steps 5-7 of spec §4.3: record the operation's outcome against the
    /// row opened by `check_or_begin`. A no-op if the handle carries no key
    /// (unkeyed calls are never cached).
    #[instrument(skip(self, handle, outcome))]
    pub async fn finalize(
        &self,
        handle: &IdempotencyHandle,
        outcome: std::result::Result<&serde_json::Value, &str>,
    ) -> Result<()> {
        let Some(key) = &handle.key else {
            return Ok(());
        };
        let shard = self.router.idempotency_shard();
        match outcome {
            Ok(body) => {
                let args = [
                    body.clone().into(),
                    handle.user_id.as_uuid().into(),
                    handle.endpoint.clone().into(),
                    key.clone().into(),
                ];
                self.router.exec_on(shard, COMPLETE_SQL, &args).await?;
            }
            Err(error_kind) => {
                let args = [
                    error_kind.into(),
                    handle.user_id.as_uuid().into(),
                    handle.endpoint.clone().into(),
                    key.clone().into(),
                ];
                self.router.exec_on(shard, FAIL_SQL, &args).await?;
            }
        }
        Ok(())
    }

    /// Delete every row whose `expires_at` has passed (spec §4.3: "a
    /// sweeper removes rows whose `expires_at` has passed").
    pub async fn sweep(&self) -> Result<u64> {
        let shard = self.router.idempotency_shard();
        let deleted = self.router.exec_on(shard, SWEEP_SQL, &[Utc::now().into()]).await?;
        Ok(deleted)
    }

    /// Spawn the sweeper as a background task on `interval`, matching the
    /// teacher's `LedgerActor::run` batching-timer shape. The returned
    /// handle can be aborted on shutdown.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.sweep().await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "idempotency sweeper removed expired rows");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "idempotency sweeper pass failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_without_live_shards() -> IdempotencyStore {
        let router = Arc::new(ShardRouter::from_pools(
            Vec::new(),
            shard_router::RouterConfig {
                shard_urls: Vec::new(),
                idempotency_shard: 0,
                pool: shard_router::PoolConfig::default(),
                retry: shard_router::RetryPolicy::default(),
            },
        ));
        IdempotencyStore::new(router)
    }

    /// An unkeyed call never touches the store at all (spec §4.3 step 2):
    /// this must hold even against a router with zero live shards.
    #[tokio::test]
    async fn unkeyed_call_proceeds_without_touching_any_shard() {
        let store = store_without_live_shards();
        let body = serde_json::json!({"project": "P1", "amount": "5000.00"});
        let outcome = store.check_or_begin(UserId::new_v4(), "create_investment", None, &body).await.unwrap();
        match outcome {
            Outcome::Proceed(handle) => assert!(!handle.is_keyed()),
            Outcome::Replay(_) => panic!("an unkeyed call can never replay"),
        }
    }

    /// A malformed key (spec §8 scenario S6) is rejected by the key grammar
    /// before any shard lookup, so this also needs no live database.
    #[tokio::test]
    async fn malformed_key_is_rejected_before_any_shard_lookup() {
        let store = store_without_live_shards();
        let body = serde_json::json!({"project": "P1", "amount": "5000.00"});
        let err = store
            .check_or_begin(UserId::new_v4(), "create_investment", Some("short"), &body)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Core(ledger_model::Error::BadIdempotencyKey(_))));
    }
}
