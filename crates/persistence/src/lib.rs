//! `groundwork-persistence` — a thin persistence layer over sqlx/PostgreSQL.
//!
//! The layer is built from a handful of small pieces:
//!
//! - a **model** of entity-type mappings, assembled by configurations that
//!   apply ordered [`Convention`](model::Convention)s (key generation, audit
//!   columns, a row-version concurrency token) to an entity type builder;
//! - a change-tracking [`PersistenceContext`] that registers
//!   adds/updates/deletes and flushes them in order on save;
//! - generic [`Repository`] and [`UnitOfWork`] façades over the context, with
//!   a [`Transaction`] wrapper around the engine's native transaction;
//! - a [`DbInitializer`] that migrates when migrations are declared,
//!   otherwise creates the model's schema, then runs a seed hook.
//!
//! Pooling, the wire protocol, type codecs and migration execution stay in
//! `sqlx`; engine failures propagate unchanged inside
//! [`PersistenceError::Database`].

pub mod config;
pub mod context;
pub mod error;
pub mod initializer;
pub mod mapping;
pub mod model;
pub mod query;
pub mod repository;
mod sql;
pub mod transaction;
pub mod unit_of_work;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use config::DatabaseConfig;
pub use context::{EntityState, PersistenceContext};
pub use error::{ModelError, PersistenceError, PersistenceResult};
pub use initializer::{DbInitializer, PostgresSchemaManager, SchemaManager};
pub use mapping::EntityRow;
pub use model::{
    AuditConvention, ColumnDef, ColumnType, Convention, DerivedEntityTypeConfiguration,
    EntityMapping, EntityTypeBuilder, EntityTypeConfiguration, IdConvention, KeyConvention, Model,
    ModelBuilder, OwnedNavigationBuilder, PropertyBuilder, ValueGeneration, ValueSource,
};
pub use query::{EntityQuery, FilterOp};
pub use repository::Repository;
pub use transaction::Transaction;
pub use unit_of_work::UnitOfWork;
pub use value::{RowValues, SqlValue};
