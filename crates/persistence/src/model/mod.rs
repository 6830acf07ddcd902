//! Mapping model: per-entity metadata built from configurations, frozen into
//! an immutable registry the context and initializer read.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};

use crate::error::ModelError;
use crate::mapping::EntityRow;
use crate::sql;

pub mod builder;
pub mod configuration;
pub mod conventions;

pub use builder::{
    ColumnDef, ColumnType, EntityTypeBuilder, OwnedNavigationBuilder, PropertyBuilder,
    ValueGeneration, ValueSource,
};
pub use configuration::{DerivedEntityTypeConfiguration, EntityTypeConfiguration};
pub use conventions::{AuditConvention, Convention, IdConvention, KeyConvention};

/// Column added to root tables of a type hierarchy.
pub const DISCRIMINATOR_COLUMN: &str = "discriminator";

/// Discriminator handling for a type in a table-per-hierarchy mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Discriminator {
    pub column: String,
    /// Value stamped into rows of this entity type.
    pub value: String,
    /// Whether reads filter on the value (derived types only; reading the
    /// root type materializes every row as the root projection).
    pub filtered: bool,
}

/// Frozen mapping of one entity type: physical table plus the effective
/// column set (inherited chain included).
#[derive(Debug, Clone)]
pub struct EntityMapping {
    pub entity_name: &'static str,
    pub table: String,
    pub schema: Option<String>,
    pub columns: Vec<ColumnDef>,
    pub discriminator: Option<Discriminator>,
}

impl EntityMapping {
    pub fn key_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn concurrency_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.concurrency_token)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub(crate) fn qualified_table(&self) -> String {
        sql::qualified_table(self.schema.as_deref(), &self.table)
    }
}

/// Physical table definition (DDL input). One per root entity type; derived
/// columns are folded in as nullable.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub table: String,
    pub schema: Option<String>,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub(crate) fn qualified_name(&self) -> String {
        sql::qualified_table(self.schema.as_deref(), &self.table)
    }
}

struct RegisteredEntity {
    type_id: TypeId,
    entity_name: &'static str,
    table: String,
    schema: Option<String>,
    columns: Vec<ColumnDef>,
    base: Option<(TypeId, &'static str)>,
    errors: Vec<ModelError>,
}

/// Registry of entity type configurations; `build` validates and freezes.
#[derive(Default)]
pub struct ModelBuilder {
    default_schema: Option<String>,
    entities: Vec<RegisteredEntity>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema applied to every table without an explicit override.
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Run an entity type configuration and register the result.
    pub fn apply<E, C>(&mut self, configuration: &C) -> &mut Self
    where
        E: EntityRow,
        C: EntityTypeConfiguration<E>,
    {
        let mut builder = EntityTypeBuilder::<E>::new();
        configuration.configure(&mut builder);
        self.register(builder);
        self
    }

    /// Run a derived entity type configuration and register the result.
    pub fn apply_derived<E, C>(&mut self, configuration: &C) -> &mut Self
    where
        E: EntityRow,
        C: DerivedEntityTypeConfiguration<E>,
    {
        let mut builder = EntityTypeBuilder::<E>::new();
        configuration.configure(&mut builder);
        self.register(builder);
        self
    }

    /// Register an entity type with an inline configuration closure.
    pub fn entity<E: EntityRow>(
        &mut self,
        configure: impl FnOnce(&mut EntityTypeBuilder<E>),
    ) -> &mut Self {
        let mut builder = EntityTypeBuilder::<E>::new();
        configure(&mut builder);
        self.register(builder);
        self
    }

    fn register<E: EntityRow>(&mut self, builder: EntityTypeBuilder<E>) {
        self.entities.push(RegisteredEntity {
            type_id: TypeId::of::<E>(),
            entity_name: E::entity_name(),
            table: builder.table,
            schema: builder.schema,
            columns: builder.columns,
            base: builder.base,
            errors: builder.errors,
        });
    }

    /// Validate and freeze the model.
    pub fn build(self) -> Result<Model, ModelError> {
        for entity in &self.entities {
            if let Some(error) = entity.errors.first() {
                return Err(error.clone());
            }
        }

        let mut by_id: HashMap<TypeId, usize> = HashMap::new();
        for (index, entity) in self.entities.iter().enumerate() {
            if by_id.insert(entity.type_id, index).is_some() {
                return Err(ModelError::DuplicateEntityType {
                    entity: entity.entity_name,
                });
            }
        }

        // Resolve each type's inheritance chain up to its root.
        let mut chains: HashMap<TypeId, Vec<usize>> = HashMap::new();
        for (index, entity) in self.entities.iter().enumerate() {
            let mut chain = vec![index];
            let mut visited: HashSet<TypeId> = HashSet::from([entity.type_id]);
            let mut current = entity;
            while let Some((base_id, base_name)) = current.base {
                if !visited.insert(base_id) {
                    return Err(ModelError::InheritanceCycle {
                        entity: entity.entity_name,
                    });
                }
                let base_index =
                    *by_id
                        .get(&base_id)
                        .ok_or(ModelError::UnknownBaseType {
                            entity: current.entity_name,
                            base: base_name,
                        })?;
                chain.push(base_index);
                current = &self.entities[base_index];
            }
            chain.reverse(); // root first
            chains.insert(entity.type_id, chain);
        }

        for entity in &self.entities {
            let has_key = entity.columns.iter().any(|c| c.primary_key);
            if entity.base.is_some() {
                if has_key {
                    return Err(ModelError::KeyOnDerivedType {
                        entity: entity.entity_name,
                    });
                }
            } else if !has_key {
                return Err(ModelError::MissingKey {
                    entity: entity.entity_name,
                });
            }
        }

        // Roots that have descendants carry a discriminator column.
        let mut descendants: HashMap<TypeId, Vec<usize>> = HashMap::new();
        for (index, entity) in self.entities.iter().enumerate() {
            if entity.base.is_some() {
                let chain = &chains[&entity.type_id];
                let root = &self.entities[chain[0]];
                descendants.entry(root.type_id).or_default().push(index);
            }
        }

        let mut mappings: HashMap<TypeId, EntityMapping> = HashMap::new();
        for entity in &self.entities {
            let chain = &chains[&entity.type_id];
            let root = &self.entities[chain[0]];

            let mut columns: Vec<ColumnDef> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            for &index in chain {
                for column in &self.entities[index].columns {
                    if !seen.insert(column.name.clone()) {
                        return Err(ModelError::DuplicateColumn {
                            entity: entity.entity_name,
                            column: column.name.clone(),
                        });
                    }
                    columns.push(column.clone());
                }
            }

            let discriminator = descendants.get(&root.type_id).map(|_| Discriminator {
                column: DISCRIMINATOR_COLUMN.to_string(),
                value: entity.entity_name.to_string(),
                filtered: entity.base.is_some(),
            });

            mappings.insert(
                entity.type_id,
                EntityMapping {
                    entity_name: entity.entity_name,
                    table: root.table.clone(),
                    schema: root
                        .schema
                        .clone()
                        .or_else(|| self.default_schema.clone()),
                    columns,
                    discriminator,
                },
            );
        }

        // Physical tables: one per root, with every descendant's columns
        // folded in as nullable.
        let mut tables: Vec<TableDef> = Vec::new();
        for entity in &self.entities {
            if entity.base.is_some() {
                continue;
            }
            let mut columns = entity.columns.clone();
            if let Some(indices) = descendants.get(&entity.type_id) {
                columns.push(ColumnDef {
                    name: DISCRIMINATOR_COLUMN.to_string(),
                    column_type: ColumnType::Text,
                    nullable: false,
                    generation: ValueGeneration::Never,
                    source: ValueSource::None,
                    concurrency_token: false,
                    primary_key: false,
                });
                for &index in indices {
                    for column in &self.entities[index].columns {
                        if columns.iter().any(|c| c.name == column.name) {
                            continue; // chain duplicates already rejected above
                        }
                        let mut folded = column.clone();
                        folded.nullable = true;
                        columns.push(folded);
                    }
                }
            }
            tables.push(TableDef {
                table: entity.table.clone(),
                schema: entity
                    .schema
                    .clone()
                    .or_else(|| self.default_schema.clone()),
                columns,
            });
        }

        Ok(Model {
            default_schema: self.default_schema,
            mappings,
            tables,
        })
    }
}

/// Immutable, validated mapping model.
#[derive(Debug, Clone)]
pub struct Model {
    default_schema: Option<String>,
    mappings: HashMap<TypeId, EntityMapping>,
    tables: Vec<TableDef>,
}

impl Model {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::new()
    }

    pub fn mapping<E: EntityRow>(&self) -> Option<&EntityMapping> {
        self.mappings.get(&TypeId::of::<E>())
    }

    pub(crate) fn mapping_by_id(&self, type_id: TypeId) -> Option<&EntityMapping> {
        self.mappings.get(&type_id)
    }

    pub fn default_schema(&self) -> Option<&str> {
        self.default_schema.as_deref()
    }

    /// Physical tables, root types only.
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    /// DDL bringing an empty database up to this model's schema.
    pub fn create_statements(&self) -> Vec<String> {
        let mut statements = Vec::new();
        let mut schemas: Vec<&str> = self
            .tables
            .iter()
            .filter_map(|t| t.schema.as_deref())
            .collect();
        schemas.sort_unstable();
        schemas.dedup();
        for schema in schemas {
            statements.push(format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                sql::quote_ident(schema)
            ));
        }
        for table in &self.tables {
            statements.push(sql::create_table_statement(table));
        }
        statements
    }
}
