//! Fluent, read-only query surface over one mapped entity type.

use std::marker::PhantomData;

use sqlx::Row;

use crate::context::PersistenceContext;
use crate::error::{PersistenceError, PersistenceResult};
use crate::mapping::EntityRow;
use crate::model::EntityMapping;
use crate::sql::{self, SqlStatement};
use crate::value::SqlValue;

/// Comparison operator of a query filter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Like => "LIKE",
            FilterOp::IsNull => "IS NULL",
            FilterOp::IsNotNull => "IS NOT NULL",
        }
    }
}

/// Query over one mapped entity type.
///
/// Built by [`PersistenceContext::entities`] (or a repository's `entities`),
/// chained with `filter`/`order_by`/`limit`/`offset`, executed by a terminal
/// fetch. Queries run through the owning context, so an active transaction
/// sees its own uncommitted writes. Materialized rows feed the context's
/// row-version identity map.
pub struct EntityQuery<'a, E: EntityRow> {
    context: &'a PersistenceContext,
    filters: Vec<(String, FilterOp, SqlValue)>,
    order: Vec<(String, bool)>,
    limit: Option<u64>,
    offset: Option<u64>,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E: EntityRow> EntityQuery<'a, E> {
    pub(crate) fn new(context: &'a PersistenceContext) -> Self {
        Self {
            context,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            _entity: PhantomData,
        }
    }

    pub fn filter(mut self, column: impl Into<String>, op: FilterOp, value: impl Into<SqlValue>) -> Self {
        self.filters.push((column.into(), op, value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order.push((column.into(), descending));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub async fn fetch_all(self) -> PersistenceResult<Vec<E>> {
        let mapping = self.mapping()?;
        let statement = self.build_select(mapping);
        let rows = self.context.fetch_rows(&statement).await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            let entity = E::from_row(row)?;
            if let Some(token) = mapping.concurrency_column() {
                if let Ok(version) = row.try_get::<Vec<u8>, _>(token.name.as_str()) {
                    self.context
                        .record_version(mapping, &entity.key_value(), version)?;
                }
            }
            entities.push(entity);
        }
        Ok(entities)
    }

    pub async fn fetch_optional(self) -> PersistenceResult<Option<E>> {
        let mut query = self;
        query.limit = Some(1);
        Ok(query.fetch_all().await?.into_iter().next())
    }

    pub async fn count(self) -> PersistenceResult<u64> {
        let mapping = self.mapping()?;
        let statement = self.build_count(mapping);
        let rows = self.context.fetch_rows(&statement).await?;
        let row = rows
            .first()
            .ok_or(PersistenceError::Internal("count returned no row"))?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| PersistenceError::decode(E::entity_name(), e))?;
        Ok(count as u64)
    }

    fn mapping(&self) -> PersistenceResult<&'a EntityMapping> {
        self.context
            .model()
            .mapping::<E>()
            .ok_or(PersistenceError::UnmappedEntityType(E::entity_name()))
    }

    /// Filters plus the discriminator predicate for derived types.
    fn effective_filters(&self, mapping: &EntityMapping) -> Vec<(String, FilterOp, SqlValue)> {
        let mut filters = self.filters.clone();
        if let Some(discriminator) = &mapping.discriminator {
            if discriminator.filtered {
                filters.push((
                    discriminator.column.clone(),
                    FilterOp::Eq,
                    SqlValue::Text(discriminator.value.clone()),
                ));
            }
        }
        filters
    }

    pub(crate) fn build_select(&self, mapping: &EntityMapping) -> SqlStatement {
        let columns: Vec<String> = mapping.column_names().map(String::from).collect();
        sql::select_statement(
            &mapping.qualified_table(),
            &columns,
            &self.effective_filters(mapping),
            &self.order,
            self.limit,
            self.offset,
        )
    }

    pub(crate) fn build_count(&self, mapping: &EntityMapping) -> SqlStatement {
        sql::count_statement(&mapping.qualified_table(), &self.effective_filters(mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Customer, VipCustomer, lazy_context};

    #[tokio::test]
    async fn select_lists_mapped_columns_in_order() {
        let context = lazy_context();
        let query = context.entities::<Customer>();
        let mapping = context.model().mapping::<Customer>().unwrap();

        let statement = query.build_select(mapping);
        assert!(statement.sql.starts_with(
            "SELECT \"id\", \"creation_date\", \"last_update_date\", \"row_version\", \"name\" \
             FROM \"customer\""
        ));
        assert!(statement.params.is_empty());
    }

    #[tokio::test]
    async fn derived_type_query_filters_on_discriminator() {
        let context = lazy_context();
        let mapping = context.model().mapping::<VipCustomer>().unwrap();

        let statement = context.entities::<VipCustomer>().build_select(mapping);
        assert!(statement.sql.contains("WHERE \"discriminator\" = $1"));
        assert_eq!(
            statement.params,
            vec![SqlValue::Text("vip_customer".into())]
        );
    }

    #[tokio::test]
    async fn root_type_query_reads_whole_hierarchy() {
        let context = lazy_context();
        let mapping = context.model().mapping::<Customer>().unwrap();

        let statement = context.entities::<Customer>().build_select(mapping);
        assert!(!statement.sql.contains("WHERE"));
    }

    #[tokio::test]
    async fn chained_clauses_compose() {
        let context = lazy_context();
        let mapping = context.model().mapping::<Customer>().unwrap();

        let statement = context
            .entities::<Customer>()
            .filter("name", FilterOp::Like, "A%")
            .order_by("name", false)
            .limit(5)
            .offset(10)
            .build_select(mapping);

        assert!(statement.sql.ends_with(
            "WHERE \"name\" LIKE $1 ORDER BY \"name\" ASC LIMIT 5 OFFSET 10"
        ));
    }

    #[tokio::test]
    async fn count_applies_the_same_filters() {
        let context = lazy_context();
        let mapping = context.model().mapping::<VipCustomer>().unwrap();

        let statement = context
            .entities::<VipCustomer>()
            .filter("tier", FilterOp::Ge, 2)
            .build_count(mapping);

        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) FROM \"customer\" WHERE \"tier\" >= $1 AND \"discriminator\" = $2"
        );
    }
}
