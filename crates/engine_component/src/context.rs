//! Per-invocation context handed to entity handlers.
//!
//! Handlers never touch the scene directly while a dispatch is in flight.
//! Structural changes (spawning, destroying, joining or leaving the update
//! queues) are recorded in a [`CommandBuffer`] and applied by the scene once
//! the dispatch call returns. For `Update`/`LateUpdate` that is after the
//! whole tick, so anything a handler registers runs next tick at the earliest.

use std::collections::VecDeque;

use crate::entity::{Entity, EntityAllocator, RuntimeId};
use crate::world::EntitySlot;

/// A deferred structural change requested by a handler.
pub enum Command {
    /// Store a new entity and run its awake handlers.
    Spawn {
        /// Id allocated when the command was recorded.
        id: RuntimeId,
        /// The entity to store.
        slot: EntitySlot,
    },
    /// Destroy an entity (destroy handlers run, then it is removed).
    Destroy(RuntimeId),
    /// Join the update queue.
    RegisterUpdate(RuntimeId),
    /// Leave the update queue.
    UnregisterUpdate(RuntimeId),
    /// Join the late-update queue.
    RegisterLateUpdate(RuntimeId),
    /// Leave the late-update queue.
    UnregisterLateUpdate(RuntimeId),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn { id, slot } => f
                .debug_struct("Spawn")
                .field("id", id)
                .field("type_name", &slot.type_name)
                .finish(),
            Self::Destroy(id) => f.debug_tuple("Destroy").field(id).finish(),
            Self::RegisterUpdate(id) => f.debug_tuple("RegisterUpdate").field(id).finish(),
            Self::UnregisterUpdate(id) => f.debug_tuple("UnregisterUpdate").field(id).finish(),
            Self::RegisterLateUpdate(id) => f.debug_tuple("RegisterLateUpdate").field(id).finish(),
            Self::UnregisterLateUpdate(id) => {
                f.debug_tuple("UnregisterLateUpdate").field(id).finish()
            }
        }
    }
}

/// FIFO queue of deferred commands.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: VecDeque<Command>,
}

impl CommandBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command.
    pub fn push(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    /// Take the oldest pending command.
    pub fn pop(&mut self) -> Option<Command> {
        self.commands.pop_front()
    }

    /// Returns the number of pending commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every pending command.
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

/// Context provided to an entity handler on each invocation.
#[derive(Debug)]
pub struct SystemContext<'a> {
    /// The entity the handler is running for.
    entity: RuntimeId,
    /// The scene's current tick counter.
    tick_id: u64,
    /// Allocates ids for entities spawned from inside the handler.
    allocator: &'a mut EntityAllocator,
    /// Where structural changes are recorded.
    commands: &'a mut CommandBuffer,
}

impl<'a> SystemContext<'a> {
    /// Create a context for one handler invocation.
    #[must_use]
    pub fn new(
        entity: RuntimeId,
        tick_id: u64,
        allocator: &'a mut EntityAllocator,
        commands: &'a mut CommandBuffer,
    ) -> Self {
        Self {
            entity,
            tick_id,
            allocator,
            commands,
        }
    }

    /// The runtime id of the entity being dispatched.
    #[must_use]
    pub fn entity(&self) -> RuntimeId {
        self.entity
    }

    /// The scene's current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Spawn a new entity once this dispatch completes.
    ///
    /// The id is allocated immediately so it can be stored or passed on.
    pub fn spawn<T: Entity>(&mut self, value: T) -> RuntimeId {
        let id = self.allocator.allocate();
        self.commands.push(Command::Spawn {
            id,
            slot: EntitySlot::new(value),
        });
        id
    }

    /// Destroy an entity once this dispatch completes.
    pub fn destroy(&mut self, id: RuntimeId) {
        self.commands.push(Command::Destroy(id));
    }

    /// Put an entity on the update queue.
    pub fn register_update(&mut self, id: RuntimeId) {
        self.commands.push(Command::RegisterUpdate(id));
    }

    /// Take an entity off the update queue.
    pub fn unregister_update(&mut self, id: RuntimeId) {
        self.commands.push(Command::UnregisterUpdate(id));
    }

    /// Put an entity on the late-update queue.
    pub fn register_late_update(&mut self, id: RuntimeId) {
        self.commands.push(Command::RegisterLateUpdate(id));
    }

    /// Take an entity off the late-update queue.
    pub fn unregister_late_update(&mut self, id: RuntimeId) {
        self.commands.push(Command::UnregisterLateUpdate(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::TypeName;

    struct Bullet;

    impl TypeName for Bullet {
        fn type_name() -> &'static str {
            "test::Bullet"
        }
    }

    impl Entity for Bullet {}

    #[test]
    fn test_context_creation() {
        let mut allocator = EntityAllocator::new();
        let mut commands = CommandBuffer::new();
        let ctx = SystemContext::new(RuntimeId(7), 3, &mut allocator, &mut commands);
        assert_eq!(ctx.entity(), RuntimeId(7));
        assert_eq!(ctx.tick_id(), 3);
    }

    #[test]
    fn test_spawn_allocates_and_defers() {
        let mut allocator = EntityAllocator::new();
        let mut commands = CommandBuffer::new();
        let mut ctx = SystemContext::new(RuntimeId(1), 0, &mut allocator, &mut commands);
        let spawned = ctx.spawn(Bullet);
        ctx.register_update(spawned);
        assert!(spawned.is_valid());
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands.pop(), Some(Command::Spawn { id, .. }) if id == spawned));
        assert!(matches!(commands.pop(), Some(Command::RegisterUpdate(id)) if id == spawned));
        assert!(commands.is_empty());
    }
}
