//! The idempotency store (component C, spec §4.3): deduplicates mutating
//! requests by `(user, endpoint, key)` and `(user, endpoint, request_hash)`,
//! caching each one's response for replay.
//!
//! Grounded on the teacher's `protocol_core::canonical` module for the
//! "hash the canonical wire form" idea, generalized from its fixed-field
//! binary layout to canonical JSON since spec §3 pins SHA-256 of canonical
//! JSON specifically.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod hash;
pub mod key;
pub mod metrics;
pub mod store;

pub use config::IdempotencyConfig;
pub use error::{Error, Result};
pub use hash::canonical_json_hash;
pub use key::IdempotencyKey;
pub use metrics::Metrics;
pub use store::{CachedResponse, CompletionStatus, IdempotencyHandle, IdempotencyStore, Outcome};
