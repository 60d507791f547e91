//! The shard router (component A, spec §4.1): maps any entity identifier to
//! one of N Postgres partitions and exposes per-shard exec/query plus a
//! parallel fan-out operation.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod router;

pub use config::{PoolConfig, RetryPolicy, RouterConfig};
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use router::{route_id, FanoutResult, ShardIndex, ShardRouter};
