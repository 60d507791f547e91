//! Shared helpers for turning a [`ledger_model::Row`] — the router's
//! generic, column-name-keyed view — into one of this crate's typed
//! entities. Every domain module (`investment`, `disbursement`, `profit`,
//! `refund`) selects its own explicit column list and calls these to decode
//! the scalar fields, rather than asking Postgres for a `row_to_json` blob:
//! that keeps every fetch consistent with the untyped `exec_on`/`query_on`
//! contract `ledger_model::sql::Row` already documents.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use ledger_model::{Currency, CooperativeId, EscrowAccountId, Money, ProjectId, ProjectStatus, Row};
use rust_decimal::Decimal;
use tx_coordinator::Error as TxError;
use uuid::Uuid;

/// Fetch a required column, failing with `NotFound` (a malformed or missing
/// row is indistinguishable from "the entity isn't there" at this layer).
pub fn required<T: for<'de> serde::Deserialize<'de>>(row: &Row, entity: &str, column: &str) -> Result<T> {
    row.get::<T>(column)
        .ok_or_else(|| Error::Core(ledger_model::Error::NotFound(format!("{entity}: missing or malformed column {column}"))))
}

/// Decode a `Money` value from a `(amount, currency)` column pair.
pub fn money(row: &Row, entity: &str, amount_col: &str, currency_col: &str) -> Result<Money> {
    let amount: Decimal = required(row, entity, amount_col)?;
    let code: String = required(row, entity, currency_col)?;
    let currency = Currency::from_code(&code)
        .ok_or_else(|| Error::Core(ledger_model::Error::BadKey(format!("unknown currency code {code}"))))?;
    Ok(Money::new(amount, currency))
}

/// Decode a required `Uuid`-backed typed id column.
pub fn id_col<Id: From<Uuid>>(row: &Row, entity: &str, column: &str) -> Result<Id> {
    let raw: Uuid = required(row, entity, column)?;
    Ok(Id::from(raw))
}

/// Decode an optional `Uuid`-backed typed id column.
pub fn opt_id_col<Id: From<Uuid>>(row: &Row, column: &str) -> Option<Id> {
    row.get::<Uuid>(column).map(Id::from)
}

/// Decode a required timestamp column.
pub fn timestamp(row: &Row, entity: &str, column: &str) -> Result<DateTime<Utc>> {
    required(row, entity, column)
}

/// Single-row fetch failure helper: turn an empty `Vec<Row>` into a
/// `NotFound` naming the entity and id that was looked up.
pub fn single_row<'a>(rows: &'a [Row], entity: &str, id: impl std::fmt::Display) -> Result<&'a Row> {
    rows.first()
        .ok_or_else(|| Error::Core(ledger_model::Error::NotFound(format!("{entity} {id}"))))
}

/// Build a `tx_coordinator::Error::NotFound` naming `entity`/`id` — the
/// `TxError`-typed counterpart to [`single_row`] for use inside a coordinator
/// closure, where every `Err` must already be a `tx_coordinator::Error`.
pub fn tx_not_found(entity: &str, id: impl std::fmt::Display) -> TxError {
    TxError::Core(ledger_model::Error::NotFound(format!("{entity} {id}")))
}

fn tx_missing(entity: &str, column: &str) -> TxError {
    TxError::Core(ledger_model::Error::NotFound(format!("{entity}: missing or malformed column {column}")))
}

/// The project columns every financial-engine state machine needs: funding
/// totals (for the ceiling and escrow-attribution checks), status (for
/// transition guards), and the cooperative/currency it inherits its escrow
/// account and denomination from. Selected explicitly rather than via
/// `SELECT *` so a schema change that drops a column used elsewhere fails a
/// compile-time-checked query string review, not a silent `None`.
pub struct ProjectSnapshot {
    /// Identifier of this project.
    pub id: ProjectId,
    /// Cooperative that owns this project, and therefore its escrow account.
    pub cooperative_id: CooperativeId,
    /// Currency all funding amounts for this project are denominated in.
    pub currency: Currency,
    /// Target amount to raise.
    pub funding_goal: Decimal,
    /// Amount raised so far.
    pub current_funding: Decimal,
    /// Minimum amount that must be raised for the round to be viable.
    pub min_funding_required: Decimal,
    /// Deadline after which an unmet minimum triggers a refund.
    pub funding_deadline: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: ProjectStatus,
    /// Optional per-investment minimum amount.
    pub limit_min: Option<Decimal>,
    /// Optional per-investment maximum amount.
    pub limit_max: Option<Decimal>,
}

fn parse_project_status(s: &str) -> std::result::Result<ProjectStatus, TxError> {
    Ok(match s {
        "draft" => ProjectStatus::Draft,
        "submitted" => ProjectStatus::Submitted,
        "approved" => ProjectStatus::Approved,
        "active" => ProjectStatus::Active,
        "closed" => ProjectStatus::Closed,
        "cancelled" => ProjectStatus::Cancelled,
        other => return Err(TxError::Core(ledger_model::Error::BadKey(format!("unknown project status {other}")))),
    })
}

/// Decode a project row fetched via `SELECT_PROJECT_FOR_UPDATE` (defined in
/// `investment.rs`, reused by every module that needs a project snapshot
/// inside a coordinator closure).
pub fn project_snapshot(row: &Row) -> std::result::Result<ProjectSnapshot, TxError> {
    let status: String = row.get("status").ok_or_else(|| tx_missing("project", "status"))?;
    let currency_code: String = row.get("currency").ok_or_else(|| tx_missing("project", "currency"))?;
    Ok(ProjectSnapshot {
        id: row.get::<Uuid>("id").map(ProjectId::from).ok_or_else(|| tx_missing("project", "id"))?,
        cooperative_id: row
            .get::<Uuid>("cooperative_id")
            .map(CooperativeId::from)
            .ok_or_else(|| tx_missing("project", "cooperative_id"))?,
        currency: Currency::from_code(&currency_code)
            .ok_or_else(|| TxError::Core(ledger_model::Error::BadKey(format!("unknown currency {currency_code}"))))?,
        funding_goal: row.get("funding_goal").ok_or_else(|| tx_missing("project", "funding_goal"))?,
        current_funding: row.get("current_funding").ok_or_else(|| tx_missing("project", "current_funding"))?,
        min_funding_required: row
            .get("min_funding_required")
            .ok_or_else(|| tx_missing("project", "min_funding_required"))?,
        funding_deadline: row
            .get("funding_deadline")
            .ok_or_else(|| tx_missing("project", "funding_deadline"))?,
        status: parse_project_status(&status)?,
        limit_min: row.get("investment_limit_min"),
        limit_max: row.get("investment_limit_max"),
    })
}

/// The escrow-account columns every state machine needs to credit or debit
/// the cooperative's pooled balance.
pub struct EscrowSnapshot {
    /// Identifier of this escrow account.
    pub id: EscrowAccountId,
    /// Current balance.
    pub balance: Decimal,
    /// Cumulative amount credited from investments.
    pub total_invested_in: Decimal,
    /// Cumulative amount debited via disbursements and refunds.
    pub total_distributed_out: Decimal,
}

/// Decode an escrow-account row fetched via `SELECT_ESCROW_FOR_COOPERATIVE`
/// or `SELECT_ESCROW_FOR_UPDATE` (both defined in `investment.rs`).
pub fn escrow_snapshot(row: &Row) -> std::result::Result<EscrowSnapshot, TxError> {
    Ok(EscrowSnapshot {
        id: row
            .get::<Uuid>("id")
            .map(EscrowAccountId::from)
            .ok_or_else(|| tx_missing("escrow_account", "id"))?,
        balance: row.get("balance").ok_or_else(|| tx_missing("escrow_account", "balance"))?,
        total_invested_in: row
            .get("total_invested_in")
            .ok_or_else(|| tx_missing("escrow_account", "total_invested_in"))?,
        total_distributed_out: row
            .get("total_distributed_out")
            .ok_or_else(|| tx_missing("escrow_account", "total_distributed_out"))?,
    })
}
