//! Typed SQL values and row snapshots.
//!
//! `SqlValue` is the bridge between entity fields and bound statement
//! parameters; `RowValues` is the ordered column snapshot the change tracker
//! records when an entity is registered.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use uuid::Uuid;

/// A parameter-bindable SQL value for the mapped column types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Uuid(Uuid),
    Text(String),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    Boolean(bool),
    TimestampTz(DateTime<Utc>),
    Bytes(Vec<u8>),
    Json(JsonValue),
    Null,
}

pub(crate) type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Bind this value as the next parameter of `query`.
    ///
    /// `Null` never reaches a placeholder: the statement builders emit it as
    /// a `NULL` literal (or `IS NULL` predicate) so the engine does not have
    /// to infer a parameter type for it.
    pub(crate) fn bind_to(self, query: PgQuery<'_>) -> PgQuery<'_> {
        match self {
            SqlValue::Uuid(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
            SqlValue::SmallInt(v) => query.bind(v),
            SqlValue::Integer(v) => query.bind(v),
            SqlValue::BigInt(v) => query.bind(v),
            SqlValue::Double(v) => query.bind(v),
            SqlValue::Boolean(v) => query.bind(v),
            SqlValue::TimestampTz(v) => query.bind(v),
            SqlValue::Bytes(v) => query.bind(v),
            SqlValue::Json(v) => query.bind(v),
            SqlValue::Null => query.bind(Option::<String>::None),
        }
    }

    /// Stable textual rendering used for identity-map keys and diagnostics.
    pub fn key_string(&self) -> String {
        match self {
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::Text(v) => v.clone(),
            SqlValue::SmallInt(v) => v.to_string(),
            SqlValue::Integer(v) => v.to_string(),
            SqlValue::BigInt(v) => v.to_string(),
            SqlValue::Double(v) => v.to_string(),
            SqlValue::Boolean(v) => v.to_string(),
            SqlValue::TimestampTz(v) => v.to_rfc3339(),
            SqlValue::Bytes(v) => {
                let mut out = String::with_capacity(2 + v.len() * 2);
                out.push_str("0x");
                for b in v {
                    out.push_str(&format!("{b:02x}"));
                }
                out
            }
            SqlValue::Json(v) => v.to_string(),
            SqlValue::Null => "null".to_string(),
        }
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::BigInt(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::TimestampTz(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Ordered column-name → value snapshot of an entity row.
///
/// Order is declaration order; `set` on an existing column replaces its value
/// in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowValues {
    entries: Vec<(String, SqlValue)>,
}

impl RowValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chainable setter for building snapshots in `to_row` implementations.
    pub fn set(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<SqlValue>) {
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| name == column) {
            entry.1 = value;
        } else {
            self.entries.push((column.to_string(), value));
        }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
