//! Coordinator configuration: the bounded-lifetime execution window spec
//! §4.2 step 1 requires (default 30s).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Coordinator tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Default context deadline for `Coordinator::execute`, in seconds.
    pub default_timeout_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
        }
    }
}

impl CoordinatorConfig {
    /// The default timeout as a `Duration`.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}
