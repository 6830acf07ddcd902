//! Unit of work: one logical unit of sequential work over a context.

use std::sync::Arc;

use tracing::instrument;

use crate::context::PersistenceContext;
use crate::error::PersistenceResult;
use crate::transaction::Transaction;

/// Owns a context handle; flushes tracked changes and opens transactions.
///
/// Repositories and the unit of work share one context, so changes
/// registered through any repository are flushed by `save`. The context's
/// resources are released when the last handle drops; [`close`](Self::close)
/// is the explicit disposal point.
pub struct UnitOfWork {
    context: Arc<PersistenceContext>,
}

impl UnitOfWork {
    pub fn new(context: Arc<PersistenceContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<PersistenceContext> {
        &self.context
    }

    /// Flush tracked changes. Returns total rows affected.
    #[instrument(skip(self), err)]
    pub async fn save(&self) -> PersistenceResult<u64> {
        self.context.save_changes().await
    }

    /// Open a transaction; subsequent saves run inside it until it completes.
    #[instrument(skip(self), err)]
    pub async fn begin_transaction(&self) -> PersistenceResult<Transaction> {
        self.context.begin_transaction().await?;
        Ok(Transaction::new(self.context.clone()))
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.context.close().await;
    }
}
