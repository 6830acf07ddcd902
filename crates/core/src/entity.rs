//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// An entity is defined by its identity, not its attribute values: two
/// instances with the same key are the same entity. The key type is chosen by
/// the implementor (a uuid newtype from [`entity_id!`](crate::entity_id), an
/// integer, a natural key).
pub trait Entity {
    /// Strongly-typed entity key.
    type Key: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity key.
    fn key(&self) -> &Self::Key;
}
