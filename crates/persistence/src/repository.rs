//! Generic repository over one aggregate root type.

use std::marker::PhantomData;
use std::sync::Arc;

use groundwork_core::AggregateRoot;

use crate::context::PersistenceContext;
use crate::error::PersistenceResult;
use crate::mapping::EntityRow;
use crate::query::EntityQuery;

/// CRUD façade over one aggregate root.
///
/// Every operation delegates to the owning context's tracking operation;
/// nothing is written until the unit of work saves. The repository holds a
/// shared handle to the context, so it can never outlive it.
pub struct Repository<A>
where
    A: AggregateRoot + EntityRow,
{
    context: Arc<PersistenceContext>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> Repository<A>
where
    A: AggregateRoot + EntityRow,
{
    pub fn new(context: Arc<PersistenceContext>) -> Self {
        Self {
            context,
            _aggregate: PhantomData,
        }
    }

    /// Register `entity` for insertion.
    pub fn add(&self, entity: &A) -> PersistenceResult<()> {
        self.context.add(entity)
    }

    /// Register `entity` for update.
    pub fn update(&self, entity: &A) -> PersistenceResult<()> {
        self.context.update(entity)
    }

    /// Register `entity` for deletion.
    pub fn delete(&self, entity: &A) -> PersistenceResult<()> {
        self.context.delete(entity)
    }

    /// Queryable view over the aggregate's rows.
    pub fn entities(&self) -> EntityQuery<'_, A> {
        self.context.entities()
    }

    pub fn context(&self) -> &PersistenceContext {
        &self.context
    }
}

impl<A> Clone for Repository<A>
where
    A: AggregateRoot + EntityRow,
{
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            _aggregate: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EntityState;
    use crate::error::PersistenceError;
    use crate::testing::{Customer, lazy_context, sample_customer};
    use crate::value::SqlValue;

    fn repository() -> Repository<Customer> {
        Repository::new(Arc::new(lazy_context()))
    }

    #[tokio::test]
    async fn add_delegates_exactly_once() {
        let repository = repository();
        let customer = sample_customer("Ada");

        repository.add(&customer).unwrap();

        let pending = repository.context().pending_snapshot();
        assert_eq!(
            pending,
            vec![(EntityState::Added, SqlValue::Uuid(customer.id))]
        );
    }

    #[tokio::test]
    async fn update_and_delete_delegate_in_order() {
        let repository = repository();
        let customer = sample_customer("Ada");

        repository.update(&customer).unwrap();
        repository.delete(&customer).unwrap();

        let states: Vec<_> = repository
            .context()
            .pending_snapshot()
            .into_iter()
            .map(|(state, _)| state)
            .collect();
        assert_eq!(states, vec![EntityState::Modified, EntityState::Deleted]);
    }

    #[tokio::test]
    async fn unmapped_aggregate_is_rejected() {
        let context = Arc::new(crate::testing::lazy_context_with(
            crate::model::Model::builder().build().unwrap(),
        ));
        let repository = Repository::<Customer>::new(context);

        assert!(matches!(
            repository.add(&sample_customer("Ada")).unwrap_err(),
            PersistenceError::UnmappedEntityType("customer")
        ));
    }

    #[tokio::test]
    async fn entities_builds_a_query_over_the_shared_context() {
        let repository = repository();
        let mapping = repository
            .context()
            .model()
            .mapping::<Customer>()
            .unwrap();

        let statement = repository.entities().build_select(mapping);
        assert!(statement.sql.contains("FROM \"customer\""));
    }
}
