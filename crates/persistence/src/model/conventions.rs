//! Mapping conventions: reusable, ordered mutations of an entity type builder.

use crate::mapping::EntityRow;
use crate::model::builder::{ColumnType, EntityTypeBuilder, ValueGeneration, ValueSource};

/// Audit column written once, at insert.
pub const CREATION_DATE: &str = "creation_date";
/// Audit column rewritten on every update.
pub const LAST_UPDATE_DATE: &str = "last_update_date";
/// Concurrency token, refreshed on insert and update.
pub const ROW_VERSION: &str = "row_version";

/// A composable mapping rule applied to an entity type during model
/// configuration.
///
/// Conventions are stateless with respect to the builder: each is a pure
/// mutation, and a configuration applies its conventions in list order.
pub trait Convention<E: EntityRow> {
    fn apply(&self, builder: &mut EntityTypeBuilder<E>);
}

/// Declares a designated column as the primary key.
///
/// The column is marked required; its generation strategy follows the
/// `generated` flag (client-generated on insert for uuid keys, engine default
/// for other generated types, never otherwise).
pub struct KeyConvention {
    column: String,
    column_type: ColumnType,
    generated: bool,
}

impl KeyConvention {
    pub fn new(column: impl Into<String>, column_type: ColumnType, generated: bool) -> Self {
        Self {
            column: column.into(),
            column_type,
            generated,
        }
    }
}

impl<E: EntityRow> Convention<E> for KeyConvention {
    fn apply(&self, builder: &mut EntityTypeBuilder<E>) {
        let generation = if self.generated {
            ValueGeneration::OnInsert
        } else {
            ValueGeneration::Never
        };
        let source = if self.generated && self.column_type == ColumnType::Uuid {
            ValueSource::Key
        } else {
            ValueSource::None
        };

        builder
            .property(&self.column, self.column_type)
            .required()
            .generated(generation)
            .source(source);
        builder.has_key(&self.column);
    }
}

/// [`KeyConvention`] preset to the conventional uuid `id` column.
pub struct IdConvention {
    inner: KeyConvention,
}

impl IdConvention {
    pub fn new(generated: bool) -> Self {
        Self {
            inner: KeyConvention::new("id", ColumnType::Uuid, generated),
        }
    }
}

impl<E: EntityRow> Convention<E> for IdConvention {
    fn apply(&self, builder: &mut EntityTypeBuilder<E>) {
        Convention::<E>::apply(&self.inner, builder);
    }
}

/// Adds the audit shadow columns.
///
/// - `creation_date`: required timestamptz, generated on insert;
/// - `last_update_date`: nullable timestamptz, generated on update;
/// - `row_version`: required bytea concurrency token, generated on insert
///   and update.
#[derive(Default)]
pub struct AuditConvention;

impl AuditConvention {
    pub fn new() -> Self {
        Self
    }
}

impl<E: EntityRow> Convention<E> for AuditConvention {
    fn apply(&self, builder: &mut EntityTypeBuilder<E>) {
        builder
            .property(CREATION_DATE, ColumnType::TimestampTz)
            .required()
            .generated(ValueGeneration::OnInsert)
            .source(ValueSource::Now);
        builder
            .property(LAST_UPDATE_DATE, ColumnType::TimestampTz)
            .optional()
            .generated(ValueGeneration::OnUpdate)
            .source(ValueSource::Now);
        builder
            .property(ROW_VERSION, ColumnType::Bytes)
            .required()
            .generated(ValueGeneration::OnInsertAndUpdate)
            .source(ValueSource::RowVersion)
            .concurrency_token();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Customer;

    fn find<'a>(builder: &'a EntityTypeBuilder<Customer>, name: &str) -> &'a crate::model::ColumnDef {
        builder
            .columns
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("column {name} not declared"))
    }

    #[test]
    fn key_convention_generated_key() {
        let mut builder = EntityTypeBuilder::<Customer>::new();
        Convention::apply(
            &KeyConvention::new("id", ColumnType::Uuid, true),
            &mut builder,
        );

        let id = find(&builder, "id");
        assert!(!id.nullable);
        assert!(id.primary_key);
        assert_eq!(id.generation, ValueGeneration::OnInsert);
        assert_eq!(id.source, ValueSource::Key);
    }

    #[test]
    fn key_convention_unmanaged_key() {
        let mut builder = EntityTypeBuilder::<Customer>::new();
        Convention::apply(
            &KeyConvention::new("code", ColumnType::Text, false),
            &mut builder,
        );

        let code = find(&builder, "code");
        assert!(code.primary_key);
        assert_eq!(code.generation, ValueGeneration::Never);
        assert_eq!(code.source, ValueSource::None);
    }

    #[test]
    fn id_convention_targets_id_column() {
        let mut builder = EntityTypeBuilder::<Customer>::new();
        Convention::apply(&IdConvention::new(true), &mut builder);

        let id = find(&builder, "id");
        assert!(id.primary_key);
        assert_eq!(id.column_type, ColumnType::Uuid);
    }

    #[test]
    fn audit_convention_declares_shadow_columns() {
        let mut builder = EntityTypeBuilder::<Customer>::new();
        Convention::apply(&AuditConvention::new(), &mut builder);

        let creation = find(&builder, CREATION_DATE);
        assert!(!creation.nullable);
        assert_eq!(creation.generation, ValueGeneration::OnInsert);
        assert_eq!(creation.source, ValueSource::Now);
        assert!(!creation.concurrency_token);

        let updated = find(&builder, LAST_UPDATE_DATE);
        assert!(updated.nullable);
        assert_eq!(updated.generation, ValueGeneration::OnUpdate);
        assert_eq!(updated.source, ValueSource::Now);

        let version = find(&builder, ROW_VERSION);
        assert!(!version.nullable);
        assert_eq!(version.generation, ValueGeneration::OnInsertAndUpdate);
        assert_eq!(version.source, ValueSource::RowVersion);
        assert!(version.concurrency_token);
        assert_eq!(version.column_type, ColumnType::Bytes);
    }
}
