//! `FinancialEngine`: the composition root every state-transition method in
//! `investment`, `disbursement`, `profit`, and `refund` hangs off of.
//!
//! Grounded on the teacher's `settlement::SettlementEngine`, which holds
//! exactly this shape — a database handle plus the policy config every
//! operation consults — generalized to the router/coordinator/idempotency/
//! audit stack this workspace builds instead of a single pool.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use audit_log::AuditWriter;
use idempotency_store::{IdempotencyStore, Outcome};
use ledger_model::UserId;
use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};
use shard_router::ShardRouter;
use std::future::Future;
use std::sync::Arc;
use tx_coordinator::Coordinator;

/// Whether an idempotent call ran fresh or replayed a cached response
/// (spec §4.3: a replay must be indistinguishable in *content* from the
/// original response, but callers that care — metrics, logging — can branch
/// on this).
#[derive(Debug, Clone)]
pub enum IdempotentOutcome<T> {
    /// The operation actually ran.
    Fresh(T),
    /// A prior call's cached response was returned unchanged.
    Replayed(T),
}

impl<T> IdempotentOutcome<T> {
    /// Discard whether this was a replay and take the response.
    pub fn into_inner(self) -> T {
        match self {
            IdempotentOutcome::Fresh(t) | IdempotentOutcome::Replayed(t) => t,
        }
    }

    /// Whether this was a cached replay rather than a fresh execution.
    pub fn is_replay(&self) -> bool {
        matches!(self, IdempotentOutcome::Replayed(_))
    }
}

/// Fold an `audit_log::Error` back into a `tx_coordinator::Error` so a
/// coordinator closure can propagate an audit-write failure with `?`: every
/// `audit_log::Error` variant originates from either a shared-taxonomy
/// error, a router error, or a coordinator error, so this conversion is
/// exact, not approximate.
pub(crate) fn tx_error_from_audit(e: audit_log::Error) -> tx_coordinator::Error {
    match e {
        audit_log::Error::Core(core) => tx_coordinator::Error::Core(core),
        audit_log::Error::Router(router) => tx_coordinator::Error::Router(router),
        audit_log::Error::Coordinator(coordinator) => coordinator,
    }
}

/// Pull the structured detail out of `e` if it is a `PartiallyCommitted`
/// failure, however deeply it is wrapped by this crate's own `Error`.
fn partial_commit_detail(e: &Error) -> Option<&ledger_model::PartialCommitDetail> {
    match e {
        Error::Core(ledger_model::Error::PartiallyCommitted(detail)) => Some(detail),
        Error::Coordinator(tx_coordinator::Error::Core(ledger_model::Error::PartiallyCommitted(detail))) => Some(detail),
        _ => None,
    }
}

/// The financial flow engine (spec §4.4): every public method here is one
/// request-level operation, wired through idempotency, the coordinator, and
/// the audit log.
pub struct FinancialEngine {
    pub(crate) router: Arc<ShardRouter>,
    pub(crate) coordinator: Arc<Coordinator>,
    pub(crate) idempotency: Arc<IdempotencyStore>,
    pub(crate) audit: Arc<AuditWriter>,
    pub(crate) config: EngineConfig,
}

impl FinancialEngine {
    /// Assemble the engine over an already-connected router, with default
    /// coordinator and idempotency tuning.
    pub fn new(router: Arc<ShardRouter>, config: EngineConfig) -> Self {
        let coordinator = Arc::new(Coordinator::new(router.clone()));
        let idempotency = Arc::new(IdempotencyStore::new(router.clone()));
        let audit = Arc::new(AuditWriter::new(router.clone()));
        Self {
            router,
            coordinator,
            idempotency,
            audit,
            config,
        }
    }

    /// Assemble the engine from already-built components (used by tests and
    /// by callers that need non-default tuning on the coordinator or store).
    pub fn from_parts(
        router: Arc<ShardRouter>,
        coordinator: Arc<Coordinator>,
        idempotency: Arc<IdempotencyStore>,
        audit: Arc<AuditWriter>,
        config: EngineConfig,
    ) -> Self {
        Self {
            router,
            coordinator,
            idempotency,
            audit,
            config,
        }
    }

    /// The cooperative policy currently in force.
    pub fn policy(&self) -> &ledger_model::CooperativePolicy {
        &self.config.cooperative_policy
    }

    /// The router this engine's shards are reached through, for callers
    /// (like a background refund sweep) that need direct fanout access.
    pub fn router(&self) -> &Arc<ShardRouter> {
        &self.router
    }

    /// The idempotency store, for the sweeper to be spawned against.
    pub fn idempotency(&self) -> &Arc<IdempotencyStore> {
        &self.idempotency
    }

    /// Mint a transfer reference in the `TXN-<unix>-<8hex>` shape spec §3
    /// calls for, minted on approval of an investment or disbursement.
    pub fn generate_transfer_reference(&self) -> String {
        let unix = chrono::Utc::now().timestamp();
        let suffix: u32 = rand::thread_rng().gen();
        format!("{}-{unix}-{suffix:08x}", self.config.transfer_reference_prefix)
    }

    /// Run `body` under the idempotency store's replay-or-proceed protocol
    /// (spec §4.3 steps 1-7): a cached completion short-circuits `body`
    /// entirely; a fresh run's outcome (success or failure) is recorded
    /// against the key before returning.
    pub async fn run_idempotent<Req, Resp, F, Fut>(
        &self,
        actor: UserId,
        endpoint: &str,
        idempotency_key: Option<&str>,
        request: &Req,
        body: F,
    ) -> Result<IdempotentOutcome<Resp>>
    where
        Req: Serialize,
        Resp: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Resp>>,
    {
        let request_value = serde_json::to_value(request)
            .map_err(|e| Error::Core(ledger_model::Error::BadKey(format!("request is not serializable: {e}"))))?;

        match self
            .idempotency
            .check_or_begin(actor, endpoint, idempotency_key, &request_value)
            .await?
        {
            Outcome::Replay(cached) => {
                let resp: Resp = serde_json::from_value(cached.body).map_err(|e| {
                    Error::Core(ledger_model::Error::BadKey(format!(
                        "cached idempotent response does not match the expected shape: {e}"
                    )))
                })?;
                Ok(IdempotentOutcome::Replayed(resp))
            }
            Outcome::Proceed(handle) => match body().await {
                Ok(resp) => {
                    let body_value = serde_json::to_value(&resp).map_err(|e| {
                        Error::Core(ledger_model::Error::BadKey(format!("response is not serializable: {e}")))
                    })?;
                    self.idempotency.finalize(&handle, Ok(&body_value)).await?;
                    Ok(IdempotentOutcome::Fresh(resp))
                }
                Err(e) => {
                    if let Some(detail) = partial_commit_detail(&e) {
                        let shards: Vec<shard_router::ShardIndex> = detail
                            .committed_shards
                            .iter()
                            .copied()
                            .chain(detail.failed_shards.iter().map(|(shard, _)| *shard))
                            .collect();
                        let reasons = detail
                            .failed_shards
                            .iter()
                            .map(|(shard, err)| format!("shard {shard}: {err}"))
                            .collect::<Vec<_>>()
                            .join("; ");
                        self.audit
                            .record_partial_commit(detail.transaction_id, &shards, reasons)
                            .await;
                    }
                    let kind = e.kind();
                    if let Err(finalize_err) = self.idempotency.finalize(&handle, Err(&kind)).await {
                        tracing::warn!(
                            error = %finalize_err,
                            "failed to record idempotency failure outcome; a retry may see ConcurrentIdempotentRequest instead of replaying this failure"
                        );
                    }
                    Err(e)
                }
            },
        }
    }
}
