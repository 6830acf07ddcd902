//! Aggregate root marker for domain models.

use crate::entity::Entity;

/// Aggregate root marker.
///
/// An aggregate root is the consistency boundary of its aggregate: the only
/// entity a repository may directly load or persist. Interior entities are
/// reached through their root and stored with it.
///
/// This is intentionally a pure marker so domain modules can decide how they
/// model state transitions without bringing in any infrastructure concerns.
pub trait AggregateRoot: Entity {}
