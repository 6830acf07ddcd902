//! Persistence context: change registration and the flush pipeline.
//!
//! The context owns the connection pool and the frozen model. Registering a
//! change (`add`/`update`/`delete`) never touches the database; `save_changes`
//! replays the pending list in registration order, producing generated column
//! values (keys, audit timestamps, row-version tokens) as it goes.
//!
//! ## Thread safety
//!
//! The context is `Send + Sync` and cheap to share behind an `Arc`, but it
//! models **one logical unit of sequential work**: concurrent writers would
//! interleave their pending changes.
//!
//! ## Optimistic concurrency
//!
//! A row-version identity map remembers the last token observed per row
//! (populated by queries and flushes). Updates and deletes of rows with a
//! known token carry an `AND row_version = $n` predicate; zero affected rows
//! then surfaces as [`PersistenceError::Concurrency`]. Rows whose token was
//! never observed are written unconditionally.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Acquire, PgConnection, PgPool, Postgres};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{ModelError, PersistenceError, PersistenceResult};
use crate::mapping::EntityRow;
use crate::model::{EntityMapping, Model, ValueSource};
use crate::query::EntityQuery;
use crate::sql::{self, SqlStatement};
use crate::value::{PgQuery, RowValues, SqlValue};

/// Tracking state of a registered change.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingChange {
    pub type_id: TypeId,
    pub entity_name: &'static str,
    pub state: EntityState,
    pub key: SqlValue,
    pub values: RowValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VersionKey {
    table: String,
    key: String,
}

impl VersionKey {
    fn new(mapping: &EntityMapping, key: &SqlValue) -> Self {
        Self {
            table: mapping.qualified_table(),
            key: key.key_string(),
        }
    }
}

/// Change-tracking persistence context over a PostgreSQL pool.
pub struct PersistenceContext {
    pool: Arc<PgPool>,
    model: Model,
    changes: StdMutex<Vec<PendingChange>>,
    versions: StdMutex<HashMap<VersionKey, Vec<u8>>>,
    transaction: AsyncMutex<Option<sqlx::Transaction<'static, Postgres>>>,
}

impl PersistenceContext {
    pub fn new(pool: PgPool, model: Model) -> Self {
        Self {
            pool: Arc::new(pool),
            model,
            changes: StdMutex::new(Vec::new()),
            versions: StdMutex::new(HashMap::new()),
            transaction: AsyncMutex::new(None),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Register an insert.
    pub fn add<E: EntityRow>(&self, entity: &E) -> PersistenceResult<()> {
        self.track(entity, EntityState::Added)
    }

    /// Register an update.
    pub fn update<E: EntityRow>(&self, entity: &E) -> PersistenceResult<()> {
        self.track(entity, EntityState::Modified)
    }

    /// Register a delete.
    pub fn delete<E: EntityRow>(&self, entity: &E) -> PersistenceResult<()> {
        self.track(entity, EntityState::Deleted)
    }

    /// Queryable view over one mapped entity type.
    pub fn entities<E: EntityRow>(&self) -> EntityQuery<'_, E> {
        EntityQuery::new(self)
    }

    pub fn pending_count(&self) -> usize {
        self.changes.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending_count() > 0
    }

    /// Drop every registered change without writing it.
    pub fn discard_changes(&self) -> PersistenceResult<()> {
        self.changes()?.clear();
        Ok(())
    }

    /// Flush registered changes in registration order.
    ///
    /// Runs on the active transaction if one is open, otherwise inside a
    /// fresh transaction so a save is atomic either way. Returns total rows
    /// affected. On success the pending list is cleared; on failure it is
    /// kept so the caller can retry or discard.
    #[instrument(skip(self), fields(pending = self.pending_count()), err)]
    pub async fn save_changes(&self) -> PersistenceResult<u64> {
        let changes: Vec<PendingChange> = self.changes()?.clone();
        if changes.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut slot = self.transaction.lock().await;
        let (affected, version_updates) = match slot.as_mut() {
            Some(tx) => self.flush(&mut *tx, &changes, now).await?,
            None => {
                let mut conn = self
                    .pool
                    .acquire()
                    .await
                    .map_err(|e| PersistenceError::database("acquire", e))?;
                let mut tx = conn
                    .begin()
                    .await
                    .map_err(|e| PersistenceError::database("begin", e))?;
                let result = self.flush(&mut tx, &changes, now).await?;
                tx.commit()
                    .await
                    .map_err(|e| PersistenceError::database("commit", e))?;
                result
            }
        };
        drop(slot);

        self.changes()?.clear();
        let mut versions = self.versions()?;
        for (key, version) in version_updates {
            match version {
                Some(version) => {
                    versions.insert(key, version);
                }
                None => {
                    versions.remove(&key);
                }
            }
        }
        debug!(affected, "changes flushed");
        Ok(affected)
    }

    fn track<E: EntityRow>(&self, entity: &E, state: EntityState) -> PersistenceResult<()> {
        let mapping = self
            .model
            .mapping::<E>()
            .ok_or(PersistenceError::UnmappedEntityType(E::entity_name()))?;

        let values = entity.to_row();
        for (name, _) in values.iter() {
            if mapping.column(name).is_none() {
                return Err(ModelError::UnknownColumn {
                    entity: E::entity_name(),
                    column: name.to_string(),
                }
                .into());
            }
        }

        debug!(entity = E::entity_name(), state = ?state, "change registered");
        self.changes()?.push(PendingChange {
            type_id: TypeId::of::<E>(),
            entity_name: E::entity_name(),
            state,
            key: entity.key_value(),
            values,
        });
        Ok(())
    }

    async fn flush(
        &self,
        conn: &mut PgConnection,
        changes: &[PendingChange],
        now: DateTime<Utc>,
    ) -> PersistenceResult<(u64, Vec<(VersionKey, Option<Vec<u8>>)>)> {
        let mut affected = 0u64;
        let mut version_updates = Vec::new();

        for change in changes {
            let mapping = self
                .model
                .mapping_by_id(change.type_id)
                .ok_or(PersistenceError::UnmappedEntityType(change.entity_name))?;
            match change.state {
                EntityState::Added => {
                    let (rows, version) = self.flush_insert(conn, mapping, change, now).await?;
                    affected += rows;
                    if let Some(version) = version {
                        version_updates.push((VersionKey::new(mapping, &change.key), Some(version)));
                    }
                }
                EntityState::Modified => {
                    let (rows, version) = self.flush_update(conn, mapping, change, now).await?;
                    affected += rows;
                    if let Some(version) = version {
                        version_updates.push((VersionKey::new(mapping, &change.key), Some(version)));
                    }
                }
                EntityState::Deleted => {
                    affected += self.flush_delete(conn, mapping, change).await?;
                    version_updates.push((VersionKey::new(mapping, &change.key), None));
                }
            }
        }

        Ok((affected, version_updates))
    }

    async fn flush_insert(
        &self,
        conn: &mut PgConnection,
        mapping: &EntityMapping,
        change: &PendingChange,
        now: DateTime<Utc>,
    ) -> PersistenceResult<(u64, Option<Vec<u8>>)> {
        let mut values = change.values.clone();
        let mut new_version = None;

        for column in &mapping.columns {
            if !column.generation.on_insert() {
                continue;
            }
            let provided = values.get(&column.name).map(|v| !v.is_null()).unwrap_or(false);
            match column.source {
                ValueSource::Now => {
                    if !provided {
                        values.insert(&column.name, SqlValue::TimestampTz(now));
                    }
                }
                ValueSource::RowVersion => {
                    let version = new_row_version();
                    values.insert(&column.name, SqlValue::Bytes(version.clone()));
                    new_version = Some(version);
                }
                ValueSource::Key => {
                    if !provided {
                        values.insert(&column.name, SqlValue::Uuid(Uuid::new_v4()));
                    }
                }
                // Engine-generated: leave the column out of the statement.
                ValueSource::None => {}
            }
        }

        let mut columns: Vec<(String, SqlValue)> = Vec::new();
        for column in &mapping.columns {
            if let Some(value) = values.get(&column.name) {
                columns.push((column.name.clone(), value.clone()));
            }
        }
        if let Some(discriminator) = &mapping.discriminator {
            columns.push((
                discriminator.column.clone(),
                SqlValue::Text(discriminator.value.clone()),
            ));
        }

        let statement = sql::insert_statement(&mapping.qualified_table(), &columns);
        let result = bind_statement(&statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| PersistenceError::database("insert", e))?;

        let version = mapping.concurrency_column().and(new_version);
        Ok((result.rows_affected(), version))
    }

    async fn flush_update(
        &self,
        conn: &mut PgConnection,
        mapping: &EntityMapping,
        change: &PendingChange,
        now: DateTime<Utc>,
    ) -> PersistenceResult<(u64, Option<Vec<u8>>)> {
        let mut values = change.values.clone();
        let mut new_version = None;

        for column in &mapping.columns {
            if !column.generation.on_update() {
                continue;
            }
            match column.source {
                ValueSource::Now => {
                    values.insert(&column.name, SqlValue::TimestampTz(now));
                }
                ValueSource::RowVersion => {
                    let version = new_row_version();
                    values.insert(&column.name, SqlValue::Bytes(version.clone()));
                    new_version = Some(version);
                }
                ValueSource::Key | ValueSource::None => {}
            }
        }

        let sets: Vec<(String, SqlValue)> = mapping
            .columns
            .iter()
            .filter(|c| !c.primary_key)
            .filter_map(|c| values.get(&c.name).map(|v| (c.name.clone(), v.clone())))
            .collect();
        if sets.is_empty() {
            // Key-only mapping with nothing generated on update: no-op.
            return Ok((0, None));
        }

        let predicates = self.write_predicates(mapping, change)?;
        let statement = sql::update_statement(&mapping.qualified_table(), &sets, &predicates);
        let result = bind_statement(&statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| PersistenceError::database("update", e))?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::Concurrency {
                entity: mapping.entity_name.to_string(),
                key: change.key.key_string(),
            });
        }

        let version = mapping.concurrency_column().and(new_version);
        Ok((result.rows_affected(), version))
    }

    async fn flush_delete(
        &self,
        conn: &mut PgConnection,
        mapping: &EntityMapping,
        change: &PendingChange,
    ) -> PersistenceResult<u64> {
        let predicates = self.write_predicates(mapping, change)?;
        let statement = sql::delete_statement(&mapping.qualified_table(), &predicates);
        let result = bind_statement(&statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| PersistenceError::database("delete", e))?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::Concurrency {
                entity: mapping.entity_name.to_string(),
                key: change.key.key_string(),
            });
        }
        Ok(result.rows_affected())
    }

    /// Key predicate, plus the concurrency-token predicate when the row's
    /// token has been observed.
    fn write_predicates(
        &self,
        mapping: &EntityMapping,
        change: &PendingChange,
    ) -> PersistenceResult<Vec<(String, SqlValue)>> {
        let key_column = mapping
            .key_column()
            .ok_or(PersistenceError::Internal("mapping without key column"))?;
        let mut predicates = vec![(key_column.name.clone(), change.key.clone())];

        if let Some(token) = mapping.concurrency_column() {
            let known = self
                .versions()?
                .get(&VersionKey::new(mapping, &change.key))
                .cloned();
            if let Some(version) = known {
                predicates.push((token.name.clone(), SqlValue::Bytes(version)));
            }
        }
        Ok(predicates)
    }

    // Query plumbing, used by `EntityQuery`.

    pub(crate) async fn fetch_rows(&self, statement: &SqlStatement) -> PersistenceResult<Vec<PgRow>> {
        let mut slot = self.transaction.lock().await;
        let result = match slot.as_mut() {
            Some(tx) => bind_statement(statement).fetch_all(&mut **tx).await,
            None => bind_statement(statement).fetch_all(&*self.pool).await,
        };
        result.map_err(|e| PersistenceError::database("select", e))
    }

    pub(crate) fn record_version(
        &self,
        mapping: &EntityMapping,
        key: &SqlValue,
        version: Vec<u8>,
    ) -> PersistenceResult<()> {
        self.versions()?
            .insert(VersionKey::new(mapping, key), version);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn known_version(&self, mapping: &EntityMapping, key: &SqlValue) -> Option<Vec<u8>> {
        self.versions
            .lock()
            .ok()
            .and_then(|v| v.get(&VersionKey::new(mapping, key)).cloned())
    }

    // Transaction slot, used by `UnitOfWork`/`Transaction`.

    #[instrument(skip(self), err)]
    pub(crate) async fn begin_transaction(&self) -> PersistenceResult<()> {
        let mut slot = self.transaction.lock().await;
        if slot.is_some() {
            return Err(PersistenceError::TransactionActive);
        }
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PersistenceError::database("begin", e))?;
        *slot = Some(tx);
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn commit_transaction(&self) -> PersistenceResult<()> {
        let tx = { self.transaction.lock().await.take() };
        let tx = tx.ok_or(PersistenceError::NoActiveTransaction)?;
        tx.commit()
            .await
            .map_err(|e| PersistenceError::database("commit", e))
    }

    #[instrument(skip(self), err)]
    pub(crate) async fn rollback_transaction(&self) -> PersistenceResult<()> {
        let tx = { self.transaction.lock().await.take() };
        let tx = tx.ok_or(PersistenceError::NoActiveTransaction)?;
        tx.rollback()
            .await
            .map_err(|e| PersistenceError::database("rollback", e))
    }

    /// Clear the slot without completing; the native drop rolls back.
    pub(crate) fn abandon_transaction(&self) {
        if let Ok(mut slot) = self.transaction.try_lock() {
            slot.take();
        }
    }

    pub async fn in_transaction(&self) -> bool {
        self.transaction.lock().await.is_some()
    }

    /// Close the underlying pool. Outstanding handles keep working only for
    /// already-acquired connections; new work fails fast.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    #[cfg(test)]
    pub(crate) fn pending_snapshot(&self) -> Vec<(EntityState, SqlValue)> {
        self.changes
            .lock()
            .map(|c| c.iter().map(|p| (p.state, p.key.clone())).collect())
            .unwrap_or_default()
    }

    fn changes(&self) -> PersistenceResult<MutexGuard<'_, Vec<PendingChange>>> {
        self.changes
            .lock()
            .map_err(|_| PersistenceError::Internal("change tracker lock poisoned"))
    }

    fn versions(&self) -> PersistenceResult<MutexGuard<'_, HashMap<VersionKey, Vec<u8>>>> {
        self.versions
            .lock()
            .map_err(|_| PersistenceError::Internal("version map lock poisoned"))
    }
}

fn bind_statement<'q>(statement: &'q SqlStatement) -> PgQuery<'q> {
    let mut query: PgQuery<'q> = sqlx::query(&statement.sql);
    for param in &statement.params {
        query = param.clone().bind_to(query);
    }
    query
}

/// Fresh opaque concurrency token.
fn new_row_version() -> Vec<u8> {
    Uuid::new_v4().into_bytes().to_vec()
}
