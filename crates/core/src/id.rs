//! Strongly-typed identifier support.
//!
//! Consumers declare one uuid-backed newtype per entity instead of passing
//! bare `Uuid`s around, so a customer id can never be handed to an order
//! lookup.

// Re-exported for use by the generated code of `entity_id!`.
#[doc(hidden)]
pub use uuid::Uuid;

/// Declares a uuid-backed identifier newtype.
///
/// The generated type is `Copy`, hash/eq by value, serde-transparent, and
/// parses/prints as the underlying uuid.
///
/// ```
/// use groundwork_core::entity_id;
///
/// entity_id!(
///     /// Identifier of a customer.
///     pub struct CustomerId
/// );
///
/// let id = CustomerId::new();
/// let parsed: CustomerId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[macro_export]
macro_rules! entity_id {
    ($(#[$meta:meta])* $vis:vis struct $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        $vis struct $name($crate::id::Uuid);

        impl $name {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in
            /// tests for determinism.
            pub fn new() -> Self {
                Self($crate::id::Uuid::now_v7())
            }

            pub fn from_uuid(uuid: $crate::id::Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &$crate::id::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$crate::id::Uuid> for $name {
            fn from(value: $crate::id::Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $crate::id::Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl core::str::FromStr for $name {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = $crate::id::Uuid::from_str(s).map_err(|e| {
                    $crate::DomainError::invalid_id(format!(
                        "{}: {}",
                        stringify!($name),
                        e
                    ))
                })?;
                Ok(Self(uuid))
            }
        }
    };
}
