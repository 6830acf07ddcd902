//! Entity type configurations: conventions first, entity specifics second.

use crate::mapping::EntityRow;
use crate::model::builder::EntityTypeBuilder;
use crate::model::conventions::{AuditConvention, Convention, IdConvention};

/// Configuration of one entity type.
///
/// `configure` applies [`conventions`](Self::conventions) in list order, then
/// the per-entity hook. The default convention list is the generated-uuid id
/// convention followed by the audit convention.
pub trait EntityTypeConfiguration<E: EntityRow> {
    /// Ordered conventions applied before the per-entity hook.
    fn conventions(&self) -> Vec<Box<dyn Convention<E>>> {
        vec![
            Box::new(IdConvention::new(true)),
            Box::new(AuditConvention::new()),
        ]
    }

    /// Entity-specific configuration.
    fn configure_entity(&self, builder: &mut EntityTypeBuilder<E>);

    /// Apply conventions in order, then the per-entity hook.
    fn configure(&self, builder: &mut EntityTypeBuilder<E>) {
        for convention in self.conventions() {
            convention.apply(builder);
        }
        self.configure_entity(builder);
    }
}

/// Configuration of a derived entity type (table-per-hierarchy).
///
/// Declares the base type **before** the per-entity hook and applies no
/// conventions of its own: key and audit columns are inherited from the
/// base type's configuration.
pub trait DerivedEntityTypeConfiguration<E: EntityRow> {
    /// The base entity type this type derives from.
    type Base: EntityRow;

    /// Entity-specific configuration (the derived type's own columns).
    fn configure_entity(&self, builder: &mut EntityTypeBuilder<E>);

    /// Set the base type, then apply the per-entity hook.
    fn configure(&self, builder: &mut EntityTypeBuilder<E>) {
        builder.has_base_type::<Self::Base>();
        self.configure_entity(builder);
    }
}
