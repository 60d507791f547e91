//! Router configuration: one database URL per shard plus the dedicated
//! idempotency shard and pool tuning knobs.
//!
//! Follows `ledger_core::config::Config`'s `from_file`/`from_env` split.

use serde::{Deserialize, Serialize};

/// Per-shard connection pool tuning, matching the reference numbers in
/// spec §4.1 (25 open / 10 idle / 5-minute max lifetime).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum open connections per shard.
    pub max_connections: u32,
    /// Minimum idle connections kept warm per shard.
    pub min_connections: u32,
    /// Maximum lifetime of a pooled connection, in seconds.
    pub max_lifetime_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 25,
            min_connections: 10,
            max_lifetime_secs: 300,
        }
    }
}

/// Bounded retry policy for transient shard errors (spec §4.1: default 3
/// attempts, linear backoff `attempt * 100ms`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Backoff multiplier, in milliseconds, scaled by attempt number.
    pub backoff_step_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step_ms: 100,
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// One Postgres connection URL per shard, ordered by shard index.
    pub shard_urls: Vec<String>,
    /// Index of the shard that owns `idempotency_keys` /
    /// `idempotency_sequence` (spec §6 pins this to shard 0).
    pub idempotency_shard: usize,
    /// Pool tuning, shared by all shards.
    pub pool: PoolConfig,
    /// Retry policy for transient errors.
    pub retry: RetryPolicy,
}

impl RouterConfig {
    /// Number of shards this configuration describes.
    pub fn shard_count(&self) -> usize {
        self.shard_urls.len()
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::Core(ledger_model::Error::Transient(format!(
                "reading router config: {e}"
            )))
        })?;
        toml::from_str(&content).map_err(|e| {
            crate::Error::Core(ledger_model::Error::BadKey(format!(
                "parsing router config: {e}"
            )))
        })
    }

    /// Load from environment variables: `SHARD_URL_0`, `SHARD_URL_1`, ...
    /// up to `SHARD_COUNT`, plus `IDEMPOTENCY_SHARD` (default 0).
    pub fn from_env() -> crate::Result<Self> {
        let count: usize = std::env::var("SHARD_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4);

        let mut shard_urls = Vec::with_capacity(count);
        for i in 0..count {
            let key = format!("SHARD_URL_{i}");
            let url = std::env::var(&key).map_err(|_| {
                crate::Error::Core(ledger_model::Error::Transient(format!(
                    "missing environment variable {key}"
                )))
            })?;
            shard_urls.push(url);
        }

        let idempotency_shard = std::env::var("IDEMPOTENCY_SHARD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            shard_urls,
            idempotency_shard,
            pool: PoolConfig::default(),
            retry: RetryPolicy::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_matches_reference_numbers() {
        let pool = PoolConfig::default();
        assert_eq!(pool.max_connections, 25);
        assert_eq!(pool.min_connections, 10);
        assert_eq!(pool.max_lifetime_secs, 300);
    }

    #[test]
    fn default_retry_matches_reference_numbers() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.backoff_step_ms, 100);
    }
}
