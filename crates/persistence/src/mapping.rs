//! Entity ↔ row mapping contract.

use sqlx::postgres::PgRow;

use groundwork_core::Entity;

use crate::error::PersistenceResult;
use crate::value::{RowValues, SqlValue};

/// Mapping between an entity type and its relational row shape.
///
/// This is the contract the persistence layer is generic over: how to name
/// the type, render its key, snapshot its mapped fields, and materialize it
/// from a fetched row. Shadow columns (audit timestamps, the row-version
/// token) are **not** part of `to_row`; the flush pipeline produces them.
pub trait EntityRow: Entity + Sized + Send + Sync + 'static {
    /// Stable entity-type name.
    ///
    /// Doubles as the default table name and as the discriminator value in
    /// table-per-hierarchy mapping.
    fn entity_name() -> &'static str;

    /// The key rendered as a bindable value.
    fn key_value(&self) -> SqlValue;

    /// Snapshot of the mapped (non-shadow) columns.
    fn to_row(&self) -> RowValues;

    /// Materialize an instance from a fetched row.
    ///
    /// Implementations read their columns with [`sqlx::Row::try_get`] and map
    /// failures through [`PersistenceError::Decode`](crate::PersistenceError).
    fn from_row(row: &PgRow) -> PersistenceResult<Self>;
}
