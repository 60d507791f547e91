//! Wire-agnostic SQL argument and row representations.
//!
//! The shard router's contract (spec §4.1, §6) is `execOn(shard, stmt, args)`
//! / `queryOn(shard, stmt, args)` — a generic exec/query pair, not one method
//! per entity. `SqlValue` is the argument vocabulary that crosses that
//! boundary; `Row` is what comes back. This mirrors the teacher's direct use
//! of `sqlx::query(...).bind(...)` in `shard_coordinator.rs`, generalized so
//! the router doesn't need a match arm per call site's bind types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single bound SQL argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SqlValue {
    /// `NULL`.
    Null,
    /// `BOOLEAN`.
    Bool(bool),
    /// `BIGINT`.
    BigInt(i64),
    /// `NUMERIC` (exact decimal).
    Decimal(Decimal),
    /// `TEXT` / `VARCHAR`.
    Text(String),
    /// `UUID`.
    Uuid(Uuid),
    /// `TIMESTAMPTZ`.
    Timestamp(DateTime<Utc>),
    /// `JSONB`.
    Json(serde_json::Value),
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}
impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::BigInt(v)
    }
}
impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}
impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}
impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}
impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}
impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}
impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

/// Bind a slice of [`SqlValue`]s onto an `sqlx` query, in order.
///
/// Lives here (rather than in `shard-router`) so any crate that needs to
/// build ad hoc statements — `financial-engine` included — shares one
/// binding implementation instead of duplicating the match arms.
pub fn bind_values<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    values: &'q [SqlValue],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for value in values {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::BigInt(v) => query.bind(v),
            SqlValue::Decimal(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Uuid(v) => query.bind(v),
            SqlValue::Timestamp(v) => query.bind(v),
            SqlValue::Json(v) => query.bind(v),
        };
    }
    query
}

/// One returned row, as a column-name-keyed map of JSON-shaped values.
///
/// A typed `FromRow` per entity would be more idiomatic for entity-specific
/// queries, but the router's contract is deliberately untyped (it has no
/// knowledge of `financial-engine`'s entity types); callers that need typed
/// rows convert via `serde_json::from_value` on the fields they asked for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Row {
    /// Column name to JSON-encoded value.
    pub columns: std::collections::BTreeMap<String, serde_json::Value>,
}

impl Row {
    /// Fetch and deserialize a column.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, column: &str) -> Option<T> {
        self.columns
            .get(column)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

/// Decode a `PgRow` into the untyped [`Row`] representation by matching
/// each column's Postgres type name. Shared by `shard-router` (fetching
/// outside a transaction) and `tx-coordinator` (fetching inside one) so
/// both return the identical generic row shape to callers. A column whose
/// type isn't in this list decodes to `Null` rather than failing the whole
/// row — the router's contract is a best-effort generic view, not a
/// schema-aware `FromRow`.
pub fn pg_row_to_generic(row: sqlx::postgres::PgRow) -> Row {
    use sqlx::{Column, Row as _, TypeInfo};

    let mut columns = std::collections::BTreeMap::new();
    for column in row.columns() {
        let name = column.name().to_string();
        let value = match column.type_info().name() {
            "BOOL" => row.try_get::<bool, _>(name.as_str()).ok().map(serde_json::Value::from),
            "INT2" | "INT4" => row.try_get::<i32, _>(name.as_str()).ok().map(serde_json::Value::from),
            "INT8" => row.try_get::<i64, _>(name.as_str()).ok().map(serde_json::Value::from),
            "NUMERIC" => row
                .try_get::<Decimal, _>(name.as_str())
                .ok()
                .map(|d| serde_json::Value::String(d.to_string())),
            "TEXT" | "VARCHAR" => row.try_get::<String, _>(name.as_str()).ok().map(serde_json::Value::from),
            "UUID" => row
                .try_get::<Uuid, _>(name.as_str())
                .ok()
                .map(|u| serde_json::Value::String(u.to_string())),
            "TIMESTAMPTZ" | "TIMESTAMP" => row
                .try_get::<DateTime<Utc>, _>(name.as_str())
                .ok()
                .map(|t| serde_json::Value::String(t.to_rfc3339())),
            "JSONB" | "JSON" => row.try_get::<serde_json::Value, _>(name.as_str()).ok(),
            _ => None,
        };
        columns.insert(name, value.unwrap_or(serde_json::Value::Null));
    }
    Row { columns }
}
