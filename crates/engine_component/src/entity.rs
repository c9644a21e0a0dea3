//! Entity identifiers, allocation and the entity contract.
//!
//! A [`RuntimeId`] names one live entity inside one scene. Dispatch engines
//! only ever hold runtime ids, never the entity itself: the scene owns entity
//! lifetime and the engines look entities up again when they need them.

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::identity::TypeName;

/// The type-erased storage form of an entity.
pub type EntityValue = dyn Any + Send;

/// A runtime identifier for a live entity.
///
/// Ids are unique for the lifetime of the allocator that produced them and
/// are never recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuntimeId(pub u64);

impl RuntimeId {
    /// The null / invalid runtime id sentinel.
    pub const INVALID: RuntimeId = RuntimeId(0);

    /// Create a runtime id from a raw `u64`.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) id.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RuntimeId({})", self.0)
    }
}

/// Allocates monotonically increasing runtime ids.
///
/// Each scene owns one allocator.
#[derive(Debug)]
pub struct EntityAllocator {
    next_id: u64,
}

impl EntityAllocator {
    /// Creates a new allocator. Ids start at 1 (0 is reserved for [`RuntimeId::INVALID`]).
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Allocates a fresh runtime id.
    pub fn allocate(&mut self) -> RuntimeId {
        let id = self.next_id;
        self.next_id += 1;
        RuntimeId(id)
    }

    /// Returns the number of ids allocated so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.next_id - 1
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// The contract every entity type satisfies.
///
/// Entities are plain Rust values owned by a scene. Their behaviour lives in
/// module-provided handlers keyed by the entity's
/// [`TypeIdentity`](crate::TypeIdentity), so reloading a module swaps the
/// behaviour without touching live values.
///
/// # Examples
///
/// ```rust
/// use engine_component::{Entity, TypeName};
///
/// struct Ship {
///     speed: f32,
/// }
///
/// impl TypeName for Ship {
///     fn type_name() -> &'static str { "game::Ship" }
/// }
///
/// impl Entity for Ship {}
/// ```
pub trait Entity: TypeName + Any + Send {}
