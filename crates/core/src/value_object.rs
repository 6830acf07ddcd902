//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values — two
/// value objects with the same values are equal. To "modify" one, build a new
/// one. `Money { amount, currency }` is a value object; a customer with a
/// `CustomerId` is an entity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
