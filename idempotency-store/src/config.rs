//! Idempotency tuning: TTL and the wait-for-pending retry window (spec
//! §4.3, §5: default 24h TTL, up to 5 retries at 200ms each).

use serde::{Deserialize, Serialize};

/// Idempotency-store tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// Time-to-live for a cached row, in hours.
    pub ttl_hours: i64,
    /// Number of times to poll a `Pending` row before giving up.
    pub wait_retries: u32,
    /// Delay between polls, in milliseconds.
    pub wait_interval_ms: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            wait_retries: 5,
            wait_interval_ms: 200,
        }
    }
}
