//! Transaction wrapper over the context's native transaction slot.

use std::sync::Arc;

use tracing::instrument;

use crate::context::PersistenceContext;
use crate::error::PersistenceResult;

/// A transaction begun by a unit of work.
///
/// `commit`/`rollback` consume the wrapper, so completing twice is
/// unrepresentable. Dropping an uncompleted wrapper clears the context's
/// slot; the engine rolls the native transaction back on drop.
pub struct Transaction {
    context: Arc<PersistenceContext>,
    completed: bool,
}

impl Transaction {
    pub(crate) fn new(context: Arc<PersistenceContext>) -> Self {
        Self {
            context,
            completed: false,
        }
    }

    /// Commit the native transaction.
    #[instrument(skip(self), err)]
    pub async fn commit(mut self) -> PersistenceResult<()> {
        self.completed = true;
        self.context.commit_transaction().await
    }

    /// Roll the native transaction back.
    #[instrument(skip(self), err)]
    pub async fn rollback(mut self) -> PersistenceResult<()> {
        self.completed = true;
        self.context.rollback_transaction().await
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.completed {
            self.context.abandon_transaction();
        }
    }
}
