//! Entity type builder: mutable mapping metadata for one entity type.
//!
//! Conventions and configurations mutate an [`EntityTypeBuilder`] in order;
//! [`ModelBuilder`](super::ModelBuilder) freezes the accumulated state into
//! the immutable model.

use std::any::TypeId;
use std::marker::PhantomData;

use crate::error::ModelError;
use crate::mapping::EntityRow;

/// SQL-facing type of a mapped column.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Text,
    SmallInt,
    Integer,
    BigInt,
    Double,
    Boolean,
    TimestampTz,
    Bytes,
    Json,
}

impl ColumnType {
    /// PostgreSQL type name used by generated DDL.
    pub fn postgres_type(self) -> &'static str {
        match self {
            ColumnType::Uuid => "uuid",
            ColumnType::Text => "text",
            ColumnType::SmallInt => "smallint",
            ColumnType::Integer => "integer",
            ColumnType::BigInt => "bigint",
            ColumnType::Double => "double precision",
            ColumnType::Boolean => "boolean",
            ColumnType::TimestampTz => "timestamptz",
            ColumnType::Bytes => "bytea",
            ColumnType::Json => "jsonb",
        }
    }
}

/// When the flush pipeline produces a value for a column.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ValueGeneration {
    /// The application always supplies the value.
    #[default]
    Never,
    OnInsert,
    OnUpdate,
    OnInsertAndUpdate,
}

impl ValueGeneration {
    pub fn on_insert(self) -> bool {
        matches!(self, ValueGeneration::OnInsert | ValueGeneration::OnInsertAndUpdate)
    }

    pub fn on_update(self) -> bool {
        matches!(self, ValueGeneration::OnUpdate | ValueGeneration::OnInsertAndUpdate)
    }
}

/// How a generated value is produced at flush time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ValueSource {
    /// No client-side generator; a column generated `OnInsert` with this
    /// source is omitted from the statement so the engine's default applies.
    #[default]
    None,
    /// Client-generated uuid key (when the snapshot carries no value).
    Key,
    /// Current-time generator.
    Now,
    /// Opaque concurrency token, refreshed on every write.
    RowVersion,
}

/// Definition of one mapped column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub generation: ValueGeneration,
    pub source: ValueSource,
    pub concurrency_token: bool,
    pub primary_key: bool,
}

impl ColumnDef {
    fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: true,
            generation: ValueGeneration::Never,
            source: ValueSource::None,
            concurrency_token: false,
            primary_key: false,
        }
    }
}

/// Chainable configuration of a single column.
pub struct PropertyBuilder<'a> {
    column: &'a mut ColumnDef,
}

impl PropertyBuilder<'_> {
    pub fn required(self) -> Self {
        self.column.nullable = false;
        self
    }

    pub fn optional(self) -> Self {
        self.column.nullable = true;
        self
    }

    pub fn generated(self, generation: ValueGeneration) -> Self {
        self.column.generation = generation;
        self
    }

    pub fn source(self, source: ValueSource) -> Self {
        self.column.source = source;
        self
    }

    pub fn concurrency_token(self) -> Self {
        self.column.concurrency_token = true;
        self
    }
}

/// Mutable mapping metadata for one entity type.
///
/// `property` upserts: declaring an already-declared column returns a builder
/// over the existing definition, so a convention and a per-entity hook can
/// both touch the same column without conflict.
pub struct EntityTypeBuilder<E: EntityRow> {
    pub(crate) table: String,
    pub(crate) schema: Option<String>,
    pub(crate) columns: Vec<ColumnDef>,
    pub(crate) base: Option<(TypeId, &'static str)>,
    pub(crate) errors: Vec<ModelError>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: EntityRow> EntityTypeBuilder<E> {
    pub(crate) fn new() -> Self {
        Self {
            table: E::entity_name().to_string(),
            schema: None,
            columns: Vec::new(),
            base: None,
            errors: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Override the table name (default: the entity-type name).
    pub fn to_table(&mut self, name: impl Into<String>) -> &mut Self {
        self.table = name.into();
        self
    }

    /// Override the schema for this table (default: the model's schema).
    pub fn in_schema(&mut self, schema: impl Into<String>) -> &mut Self {
        self.schema = Some(schema.into());
        self
    }

    /// Declare (or reopen) a column.
    pub fn property(&mut self, name: &str, column_type: ColumnType) -> PropertyBuilder<'_> {
        let index = match self.columns.iter().position(|c| c.name == name) {
            Some(index) => {
                self.columns[index].column_type = column_type;
                index
            }
            None => {
                self.columns.push(ColumnDef::new(name, column_type));
                self.columns.len() - 1
            }
        };
        PropertyBuilder {
            column: &mut self.columns[index],
        }
    }

    /// Declare `name` as the primary key.
    ///
    /// The column must have been declared first; a later call replaces an
    /// earlier key designation.
    pub fn has_key(&mut self, name: &str) -> &mut Self {
        if self.columns.iter().any(|c| c.name == name) {
            for column in &mut self.columns {
                column.primary_key = column.name == name;
            }
        } else {
            self.errors.push(ModelError::UnknownColumn {
                entity: E::entity_name(),
                column: name.to_string(),
            });
        }
        self
    }

    /// Declare the base entity type for table-per-hierarchy mapping.
    pub fn has_base_type<B: EntityRow>(&mut self) -> &mut Self {
        self.base = Some((TypeId::of::<B>(), B::entity_name()));
        self
    }

    /// Declare an owned navigation stored in the same table.
    ///
    /// Owned columns land beside the owner's with a `nav_` prefix.
    pub fn owns_one(
        &mut self,
        navigation: &str,
        configure: impl FnOnce(&mut OwnedNavigationBuilder),
    ) -> &mut Self {
        let mut owned = OwnedNavigationBuilder::new(navigation);
        configure(&mut owned);
        for mut column in owned.columns {
            column.name = format!("{navigation}_{}", column.name);
            if self.columns.iter().any(|c| c.name == column.name) {
                self.errors.push(ModelError::DuplicateColumn {
                    entity: E::entity_name(),
                    column: column.name.clone(),
                });
            } else {
                self.columns.push(column);
            }
        }
        self
    }

    pub(crate) fn key_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }
}

/// Builder for the columns of an owned navigation.
pub struct OwnedNavigationBuilder {
    #[allow(dead_code)]
    navigation: String,
    columns: Vec<ColumnDef>,
}

impl OwnedNavigationBuilder {
    fn new(navigation: &str) -> Self {
        Self {
            navigation: navigation.to_string(),
            columns: Vec::new(),
        }
    }

    /// Declare a column of the owned type (prefixed on merge).
    pub fn property(&mut self, name: &str, column_type: ColumnType) -> PropertyBuilder<'_> {
        let index = match self.columns.iter().position(|c| c.name == name) {
            Some(index) => {
                self.columns[index].column_type = column_type;
                index
            }
            None => {
                self.columns.push(ColumnDef::new(name, column_type));
                self.columns.len() - 1
            }
        };
        PropertyBuilder {
            column: &mut self.columns[index],
        }
    }

    /// Apply an optional extra configuration closure.
    pub fn configure<F>(&mut self, action: Option<F>) -> &mut Self
    where
        F: FnOnce(&mut Self),
    {
        if let Some(action) = action {
            action(self);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Customer;

    #[test]
    fn property_reopens_existing_column() {
        let mut builder = EntityTypeBuilder::<Customer>::new();
        builder.property("name", ColumnType::Text);
        builder.property("name", ColumnType::Text).required();

        assert_eq!(builder.columns.len(), 1);
        assert!(!builder.columns[0].nullable);
    }

    #[test]
    fn has_key_replaces_earlier_designation() {
        let mut builder = EntityTypeBuilder::<Customer>::new();
        builder.property("id", ColumnType::Uuid);
        builder.property("code", ColumnType::Text);
        builder.has_key("id");
        builder.has_key("code");

        assert_eq!(builder.key_column().map(|c| c.name.as_str()), Some("code"));
        assert!(builder.errors.is_empty());
    }

    #[test]
    fn has_key_on_undeclared_column_records_error() {
        let mut builder = EntityTypeBuilder::<Customer>::new();
        builder.has_key("missing");

        assert!(matches!(
            builder.errors.as_slice(),
            [ModelError::UnknownColumn { column, .. }] if column == "missing"
        ));
    }

    #[test]
    fn owned_navigation_prefixes_columns() {
        let mut builder = EntityTypeBuilder::<Customer>::new();
        builder.owns_one("address", |owned| {
            owned.property("street", ColumnType::Text).required();
            owned.property("city", ColumnType::Text);
        });

        let names: Vec<_> = builder.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["address_street", "address_city"]);
        assert!(!builder.columns[0].nullable);
    }

    #[test]
    fn owned_navigation_collision_records_error() {
        let mut builder = EntityTypeBuilder::<Customer>::new();
        builder.property("address_street", ColumnType::Text);
        builder.owns_one("address", |owned| {
            owned.property("street", ColumnType::Text);
        });

        assert!(matches!(
            builder.errors.as_slice(),
            [ModelError::DuplicateColumn { column, .. }] if column == "address_street"
        ));
    }

    #[test]
    fn owned_configure_applies_optional_action() {
        let mut builder = EntityTypeBuilder::<Customer>::new();
        builder.owns_one("address", |owned| {
            owned.configure(Some(|o: &mut OwnedNavigationBuilder| {
                o.property("zip", ColumnType::Text);
            }));
            owned.configure(Option::<fn(&mut OwnedNavigationBuilder)>::None);
        });

        assert_eq!(builder.columns.len(), 1);
        assert_eq!(builder.columns[0].name, "address_zip");
    }
}
