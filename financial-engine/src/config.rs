//! Engine-wide tuning: the cooperative investment policy plus the
//! refund/disbursement knobs spec §4.4 leaves to deployment configuration.

use ledger_model::types::CooperativePolicy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Engine configuration, loaded once at startup and shared read-only across
/// every request (mirrors `RouterConfig::from_file`/`from_env`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Platform-wide investment bounds and concentration limit.
    pub cooperative_policy: CooperativePolicy,
    /// Processing fee charged pro rata against a refund, in basis points.
    pub refund_fee_bps: u32,
    /// Name prefix used when generating a transfer reference
    /// (`TXN-<unix>-<8hex>`, spec §3).
    pub transfer_reference_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cooperative_policy: CooperativePolicy::default(),
            refund_fee_bps: 0,
            transfer_reference_prefix: "TXN".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, falling back to defaults for any field the
    /// file omits (every field is declared with `#[serde(default)]`-style
    /// behavior via `Default` on the whole struct when the file is absent).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::Core(ledger_model::Error::Transient(format!(
                "reading engine config: {e}"
            )))
        })?;
        toml::from_str(&content).map_err(|e| {
            crate::Error::Core(ledger_model::Error::BadKey(format!(
                "parsing engine config: {e}"
            )))
        })
    }

    /// Minimum single-investment amount allowed anywhere, as a `Decimal`.
    pub fn min_investment(&self) -> Decimal {
        self.cooperative_policy.min_investment
    }

    /// Maximum single-investment amount allowed anywhere, as a `Decimal`.
    pub fn max_investment(&self) -> Decimal {
        self.cooperative_policy.max_investment
    }
}
