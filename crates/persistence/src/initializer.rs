//! Database initializer: bring schema up to date at startup, then seed.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use tracing::{info, instrument};

use crate::context::PersistenceContext;
use crate::error::{PersistenceError, PersistenceResult};

/// Schema operations the initializer drives.
#[async_trait]
pub trait SchemaManager: Send + Sync {
    /// Whether declared migrations exist for this database.
    fn has_migrations(&self) -> bool;

    /// Run pending migrations.
    async fn migrate(&self) -> PersistenceResult<()>;

    /// Create the model's schema objects if they do not exist.
    async fn ensure_created(&self) -> PersistenceResult<()>;
}

/// Schema manager over a context's pool and model.
///
/// Migrations are optional: a library consumer embedding a
/// [`Migrator`](sqlx::migrate::Migrator) (via `sqlx::migrate!`) passes it
/// here; without one, `ensure_created` derives DDL from the model.
pub struct PostgresSchemaManager {
    context: Arc<PersistenceContext>,
    migrator: Option<&'static Migrator>,
}

impl PostgresSchemaManager {
    pub fn new(context: Arc<PersistenceContext>, migrator: Option<&'static Migrator>) -> Self {
        Self { context, migrator }
    }
}

#[async_trait]
impl SchemaManager for PostgresSchemaManager {
    fn has_migrations(&self) -> bool {
        self.migrator
            .map(|m| !m.migrations.is_empty())
            .unwrap_or(false)
    }

    #[instrument(skip(self), err)]
    async fn migrate(&self) -> PersistenceResult<()> {
        let migrator = self.migrator.ok_or(PersistenceError::NoMigrator)?;
        migrator.run(self.context.pool()).await?;
        info!("migrations applied");
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn ensure_created(&self) -> PersistenceResult<()> {
        for statement in self.context.model().create_statements() {
            sqlx::query(&statement)
                .execute(self.context.pool())
                .await
                .map_err(|e| PersistenceError::database("ensure_created", e))?;
        }
        info!("schema ensured");
        Ok(())
    }
}

/// Startup initializer: migrate when migrations are declared, otherwise
/// ensure the schema exists, then run the seed hook.
#[async_trait]
pub trait DbInitializer: Send + Sync {
    /// Schema operations used by [`seed`](Self::seed).
    fn schema(&self) -> &dyn SchemaManager;

    /// Seed hook invoked after the schema is up to date. Default: no-op.
    async fn seed_data(&self) -> PersistenceResult<()> {
        Ok(())
    }

    /// Bring the schema up to date, then seed.
    async fn seed(&self) -> PersistenceResult<()> {
        let schema = self.schema();
        if schema.has_migrations() {
            schema.migrate().await?;
        } else {
            schema.ensure_created().await?;
        }
        self.seed_data().await
    }
}
