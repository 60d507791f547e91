//! The audit writer (component F, spec §4.6): one append-only `AuditEntry`
//! per state transition, written inside the same coordinator transaction as
//! the change it records, sharded by the entity under audit.
//!
//! Grounded on the teacher's `security::audit_log::{AuditSeverity,
//! AuditEvent}` — we keep the severity ladder and the event-shaped record,
//! but drop the teacher's file-based hash-chain sink (a different
//! deployment shape entirely) in favor of the sqlx-transactional row write
//! spec §4.6 actually calls for.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod metrics;
pub mod types;
pub mod writer;

pub use error::{Error, Result};
pub use metrics::Metrics;
pub use types::{AuditEntry, AuditSeverity, AuditStatus};
pub use writer::AuditWriter;
