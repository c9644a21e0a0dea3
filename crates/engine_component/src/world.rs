//! Scene-local entity storage.
//!
//! The [`World`] owns every entity of one scene. Dispatch engines resolve
//! runtime ids through it at call time, which is what lets an update queue
//! notice that an entity died without ever being told.

use std::collections::HashMap;

use crate::entity::{Entity, EntityAllocator, EntityValue, RuntimeId};
use crate::identity::{TypeIdentity, TypeName};

/// One stored entity together with its identity metadata.
pub struct EntitySlot {
    /// Identity of the entity's declared type.
    pub type_identity: TypeIdentity,
    /// Declared type name, kept for diagnostics.
    pub type_name: &'static str,
    /// Set once the entity has started tearing down.
    pub disposed: bool,
    /// The entity value itself.
    pub value: Box<EntityValue>,
}

impl EntitySlot {
    /// Wrap a typed entity.
    #[must_use]
    pub fn new<T: Entity>(value: T) -> Self {
        Self {
            type_identity: T::type_identity(),
            type_name: T::type_name(),
            disposed: false,
            value: Box::new(value),
        }
    }

    /// Returns `true` if the entity is present and not disposed.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.disposed
    }
}

impl std::fmt::Debug for EntitySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySlot")
            .field("type_identity", &self.type_identity)
            .field("type_name", &self.type_name)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

/// The entity store of a single scene.
#[derive(Debug, Default)]
pub struct World {
    /// Runtime id allocator.
    allocator: EntityAllocator,
    /// Live entities keyed by runtime id.
    slots: HashMap<RuntimeId, EntitySlot>,
}

impl World {
    /// Create a new empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a runtime id without storing anything under it yet.
    pub fn allocate(&mut self) -> RuntimeId {
        self.allocator.allocate()
    }

    /// Store a typed entity under a freshly allocated id.
    pub fn insert<T: Entity>(&mut self, value: T) -> RuntimeId {
        let id = self.allocator.allocate();
        self.slots.insert(id, EntitySlot::new(value));
        id
    }

    /// Store an already-built slot under a previously allocated id.
    ///
    /// Returns the slot that was replaced, if any.
    pub fn insert_slot(&mut self, id: RuntimeId, slot: EntitySlot) -> Option<EntitySlot> {
        self.slots.insert(id, slot)
    }

    /// Remove an entity from the world.
    pub fn remove(&mut self, id: RuntimeId) -> Option<EntitySlot> {
        self.slots.remove(&id)
    }

    /// Flag an entity as disposed without removing it.
    ///
    /// Returns `true` if the entity exists.
    pub fn mark_disposed(&mut self, id: RuntimeId) -> bool {
        match self.slots.get_mut(&id) {
            Some(slot) => {
                slot.disposed = true;
                true
            }
            None => false,
        }
    }

    /// Returns the slot of an entity, disposed or not.
    #[must_use]
    pub fn slot(&self, id: RuntimeId) -> Option<&EntitySlot> {
        self.slots.get(&id)
    }

    /// Returns the mutable slot of an entity, disposed or not.
    #[must_use]
    pub fn slot_mut(&mut self, id: RuntimeId) -> Option<&mut EntitySlot> {
        self.slots.get_mut(&id)
    }

    /// Returns the mutable slot of an entity together with the allocator, so
    /// a handler can run against the entity and still allocate ids.
    #[must_use]
    pub fn split_mut(&mut self, id: RuntimeId) -> Option<(&mut EntitySlot, &mut EntityAllocator)> {
        let slot = self.slots.get_mut(&id)?;
        Some((slot, &mut self.allocator))
    }

    /// Returns the type identity of an entity.
    #[must_use]
    pub fn type_identity(&self, id: RuntimeId) -> Option<TypeIdentity> {
        self.slots.get(&id).map(|slot| slot.type_identity)
    }

    /// Returns `true` if the entity exists and has not been disposed.
    #[must_use]
    pub fn is_alive(&self, id: RuntimeId) -> bool {
        self.slots.get(&id).is_some_and(EntitySlot::is_alive)
    }

    /// Typed read access.
    #[must_use]
    pub fn get<T: Entity>(&self, id: RuntimeId) -> Option<&T> {
        self.slots.get(&id)?.value.downcast_ref::<T>()
    }

    /// Typed write access.
    #[must_use]
    pub fn get_mut<T: Entity>(&mut self, id: RuntimeId) -> Option<&mut T> {
        self.slots.get_mut(&id)?.value.downcast_mut::<T>()
    }

    /// Returns the number of stored entities, disposed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the world holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns an iterator over every stored runtime id.
    pub fn ids(&self) -> impl Iterator<Item = RuntimeId> + '_ {
        self.slots.keys().copied()
    }

    /// Drop every entity. The allocator keeps counting.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
