//! Shared vocabulary for the crowdfunding core: identifiers, money,
//! entity types, the SQL argument wire format, and the error taxonomy every
//! other crate in the workspace re-exports and extends.
//!
//! Mirrors the teacher's `ledger-core` crate, which plays the same
//! foundation role for `settlement`, `risk-engine`, and `compliance-service`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod ids;
pub mod money;
pub mod sql;
pub mod types;

pub use error::{Error, PartialCommitDetail, Result};
pub use ids::*;
pub use money::{BasisPoints, Currency, Money, SharingRatio, BASIS_POINTS_WHOLE, CURRENCY_SCALE};
pub use sql::{SqlValue, Row};
pub use types::*;
