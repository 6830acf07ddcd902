//! Persistence error model.
//!
//! Two layers: [`ModelError`] for mapping/configuration misuse (raised when a
//! model is built or when an unmapped type reaches the context), and
//! [`PersistenceError`] for everything the layer can surface at runtime.
//! Engine failures are carried as the original `sqlx` error; constraint
//! semantics are not translated.

use thiserror::Error;

/// Result type used across the persistence layer.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Persistence operation error.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Optimistic concurrency check failed: the row was changed or removed
    /// since its version token was last observed.
    #[error("optimistic concurrency check failed for {entity} (key {key})")]
    Concurrency { entity: String, key: String },

    /// The entity type was never registered in the model.
    #[error("entity type {0} is not part of the model")]
    UnmappedEntityType(&'static str),

    /// `begin_transaction` was called while a transaction is already active.
    #[error("a transaction is already active on this context")]
    TransactionActive,

    /// Commit/rollback was requested with no active transaction.
    #[error("no active transaction on this context")]
    NoActiveTransaction,

    /// Migration was requested but no migrator is configured.
    #[error("no migrator configured")]
    NoMigrator,

    /// Model configuration misuse.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A fetched row could not be decoded into the entity type.
    #[error("row decode failed for {entity}")]
    Decode {
        entity: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Engine failure, propagated unchanged.
    #[error("database error during {operation}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Migration execution failure, propagated unchanged.
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal bookkeeping failure (poisoned lock).
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl PersistenceError {
    pub(crate) fn database(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Database { operation, source }
    }

    pub(crate) fn decode(entity: &'static str, source: sqlx::Error) -> Self {
        Self::Decode { entity, source }
    }
}

/// Model configuration error.
///
/// Every variant is a programming error at the configuration site, surfaced
/// when the model is frozen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A non-derived entity type declares no primary key.
    #[error("entity type {entity} declares no primary key")]
    MissingKey { entity: &'static str },

    /// Two declarations resolve to the same column name.
    #[error("duplicate column {column} on entity type {entity}")]
    DuplicateColumn { entity: &'static str, column: String },

    /// A builder operation referenced a column that was never declared.
    #[error("unknown column {column} on entity type {entity}")]
    UnknownColumn { entity: &'static str, column: String },

    /// The declared base type is not registered in the model.
    #[error("base type {base} of {entity} is not registered in the model")]
    UnknownBaseType {
        entity: &'static str,
        base: &'static str,
    },

    /// Base-type declarations form a cycle.
    #[error("inheritance cycle involving entity type {entity}")]
    InheritanceCycle { entity: &'static str },

    /// A derived entity type declares its own primary key.
    #[error("derived entity type {entity} must not declare its own primary key")]
    KeyOnDerivedType { entity: &'static str },

    /// The same entity type was registered twice.
    #[error("entity type {entity} is registered twice")]
    DuplicateEntityType { entity: &'static str },
}
