//! Handler sets contributed by a module.
//!
//! A module's [`EntitySystemRegistrar`](crate::EntitySystemRegistrar) fills an
//! [`EntitySystemSet`] and its [`EventSystemRegistrar`](crate::EventSystemRegistrar)
//! fills an [`EventSystemSet`]. Both sets are built from typed closures and
//! stored type-erased, keyed by [`TypeIdentity`], so that the dispatch engines
//! never see the module's concrete types.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use engine_component::{Entity, EntityValue, Event, SystemContext, TypeIdentity};
use futures::FutureExt;
use futures::future::{self, BoxFuture};

/// The type-erased form of an event payload.
pub type EventPayload = dyn Any + Send + Sync;

/// A type-erased entity handler.
pub type EntityHandler =
    Arc<dyn Fn(&mut EntityValue, &mut SystemContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// A type-erased synchronous event handler.
pub type EventHandler = Arc<dyn Fn(&EventPayload) -> anyhow::Result<()> + Send + Sync>;

/// A type-erased asynchronous event handler.
pub type AsyncEventHandler =
    Arc<dyn Fn(Arc<EventPayload>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// The lifecycle hook an entity handler is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemKind {
    /// Runs once when an entity enters a scene.
    Awake,
    /// Runs every tick while the entity is on the update queue.
    Update,
    /// Runs once when an entity is destroyed.
    Destroy,
    /// Runs after an entity has been restored from bytes.
    Deserialize,
    /// Runs every tick, after all updates, while on the late-update queue.
    LateUpdate,
}

impl SystemKind {
    /// Every kind, in dispatch-table order.
    pub const ALL: [SystemKind; 5] = [
        SystemKind::Awake,
        SystemKind::Update,
        SystemKind::Destroy,
        SystemKind::Deserialize,
        SystemKind::LateUpdate,
    ];

    /// A short lowercase label for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SystemKind::Awake => "awake",
            SystemKind::Update => "update",
            SystemKind::Destroy => "destroy",
            SystemKind::Deserialize => "deserialize",
            SystemKind::LateUpdate => "late_update",
        }
    }
}

impl std::fmt::Display for SystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Entity systems ──────────────────────────────────────────────────────────

/// One entity handler declared by a module.
#[derive(Clone)]
pub struct EntitySystem {
    /// The hook this handler runs on.
    pub kind: SystemKind,
    /// Identity of the entity type it handles.
    pub type_identity: TypeIdentity,
    /// Declared name of the entity type, for logs.
    pub type_name: &'static str,
    /// The handler itself.
    pub handler: EntityHandler,
}

impl std::fmt::Debug for EntitySystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySystem")
            .field("kind", &self.kind)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Pins a closure to the erased entity handler signature.
fn entity_handler<F>(f: F) -> EntityHandler
where
    F: Fn(&mut EntityValue, &mut SystemContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The entity handlers contributed by one module.
///
/// ```rust
/// use engine_assembly::EntitySystemSet;
/// use engine_component::{Entity, TypeName};
///
/// struct Ship { ticks: u32 }
/// impl TypeName for Ship { fn type_name() -> &'static str { "game::Ship" } }
/// impl Entity for Ship {}
///
/// let mut systems = EntitySystemSet::new();
/// systems
///     .awake::<Ship, _>(|_ship, ctx| {
///         ctx.register_update(ctx.entity());
///         Ok(())
///     })
///     .update::<Ship, _>(|ship, _ctx| {
///         ship.ticks += 1;
///         Ok(())
///     });
/// assert_eq!(systems.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntitySystemSet {
    systems: Vec<EntitySystem>,
}

impl EntitySystemSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for entity type `T` on the given hook.
    ///
    /// The erased handler fails with an error if it is ever invoked on an
    /// entity that is not a `T`.
    pub fn add<T, F>(&mut self, kind: SystemKind, f: F) -> &mut Self
    where
        T: Entity,
        F: Fn(&mut T, &mut SystemContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler = entity_handler(move |value, ctx| {
            let entity = value
                .downcast_mut::<T>()
                .ok_or_else(|| anyhow!("entity is not a {}", T::type_name()))?;
            f(entity, ctx)
        });
        self.systems.push(EntitySystem {
            kind,
            type_identity: T::type_identity(),
            type_name: T::type_name(),
            handler,
        });
        self
    }

    /// Add an [`SystemKind::Awake`] handler.
    pub fn awake<T, F>(&mut self, f: F) -> &mut Self
    where
        T: Entity,
        F: Fn(&mut T, &mut SystemContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add::<T, F>(SystemKind::Awake, f)
    }

    /// Add an [`SystemKind::Update`] handler.
    pub fn update<T, F>(&mut self, f: F) -> &mut Self
    where
        T: Entity,
        F: Fn(&mut T, &mut SystemContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add::<T, F>(SystemKind::Update, f)
    }

    /// Add a [`SystemKind::Destroy`] handler.
    pub fn destroy<T, F>(&mut self, f: F) -> &mut Self
    where
        T: Entity,
        F: Fn(&mut T, &mut SystemContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add::<T, F>(SystemKind::Destroy, f)
    }

    /// Add a [`SystemKind::Deserialize`] handler.
    pub fn deserialize<T, F>(&mut self, f: F) -> &mut Self
    where
        T: Entity,
        F: Fn(&mut T, &mut SystemContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add::<T, F>(SystemKind::Deserialize, f)
    }

    /// Add a [`SystemKind::LateUpdate`] handler.
    pub fn late_update<T, F>(&mut self, f: F) -> &mut Self
    where
        T: Entity,
        F: Fn(&mut T, &mut SystemContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add::<T, F>(SystemKind::LateUpdate, f)
    }

    /// Iterate the declared handlers in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &EntitySystem> {
        self.systems.iter()
    }

    /// Returns the number of declared handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl IntoIterator for EntitySystemSet {
    type Item = EntitySystem;
    type IntoIter = std::vec::IntoIter<EntitySystem>;

    fn into_iter(self) -> Self::IntoIter {
        self.systems.into_iter()
    }
}

// ── Event systems ───────────────────────────────────────────────────────────

/// One event subscriber declared by a module.
#[derive(Clone)]
pub struct EventSubscriber<H> {
    /// Identity of the event type.
    pub type_identity: TypeIdentity,
    /// Declared name of the event type, for logs.
    pub type_name: &'static str,
    /// The handler itself.
    pub handler: H,
}

impl<H> std::fmt::Debug for EventSubscriber<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriber")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

fn event_handler<F>(f: F) -> EventHandler
where
    F: Fn(&EventPayload) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn async_event_handler<F>(f: F) -> AsyncEventHandler
where
    F: Fn(Arc<EventPayload>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The event subscribers contributed by one module.
#[derive(Debug, Clone, Default)]
pub struct EventSystemSet {
    sync: Vec<EventSubscriber<EventHandler>>,
    asynchronous: Vec<EventSubscriber<AsyncEventHandler>>,
}

impl EventSystemSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a synchronous handler to events of type `E`.
    pub fn subscribe<E, F>(&mut self, f: F) -> &mut Self
    where
        E: Event,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler = event_handler(move |payload| {
            let event = payload
                .downcast_ref::<E>()
                .ok_or_else(|| anyhow!("event is not a {}", E::type_name()))?;
            f(event)
        });
        self.sync.push(EventSubscriber {
            type_identity: E::type_identity(),
            type_name: E::type_name(),
            handler,
        });
        self
    }

    /// Subscribe an asynchronous handler to events of type `E`.
    pub fn subscribe_async<E, F, Fut>(&mut self, f: F) -> &mut Self
    where
        E: Event,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = async_event_handler(move |payload| match payload.downcast::<E>() {
            Ok(event) => f(event).boxed(),
            Err(_) => future::ready(Err(anyhow!("event is not a {}", E::type_name()))).boxed(),
        });
        self.asynchronous.push(EventSubscriber {
            type_identity: E::type_identity(),
            type_name: E::type_name(),
            handler,
        });
        self
    }

    /// The synchronous subscribers in declaration order.
    #[must_use]
    pub fn sync_subscribers(&self) -> &[EventSubscriber<EventHandler>] {
        &self.sync
    }

    /// The asynchronous subscribers in declaration order.
    #[must_use]
    pub fn async_subscribers(&self) -> &[EventSubscriber<AsyncEventHandler>] {
        &self.asynchronous
    }

    /// Returns the total number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sync.len() + self.asynchronous.len()
    }

    /// Returns `true` if nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sync.is_empty() && self.asynchronous.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_component::{CommandBuffer, EntityAllocator, RuntimeId, TypeName};

    struct Ship {
        ticks: u32,
    }

    impl TypeName for Ship {
        fn type_name() -> &'static str {
            "test::Ship"
        }
    }

    impl Entity for Ship {}

    struct Ping(u32);

    impl TypeName for Ping {
        fn type_name() -> &'static str {
            "test::Ping"
        }
    }

    impl Event for Ping {}

    #[test]
    fn test_entity_handler_downcasts() {
        let mut set = EntitySystemSet::new();
        set.update::<Ship, _>(|ship, _ctx| {
            ship.ticks += 1;
            Ok(())
        });

        let system = set.iter().next().unwrap().clone();
        assert_eq!(system.kind, SystemKind::Update);
        assert_eq!(system.type_identity, Ship::type_identity());

        let mut allocator = EntityAllocator::new();
        let mut commands = CommandBuffer::new();
        let mut ctx = SystemContext::new(RuntimeId(1), 0, &mut allocator, &mut commands);
        let mut value: Box<EntityValue> = Box::new(Ship { ticks: 0 });
        (system.handler)(value.as_mut(), &mut ctx).unwrap();
        (system.handler)(value.as_mut(), &mut ctx).unwrap();
        assert_eq!(value.downcast_ref::<Ship>().unwrap().ticks, 2);
    }

    #[test]
    fn test_entity_handler_rejects_wrong_type() {
        let mut set = EntitySystemSet::new();
        set.awake::<Ship, _>(|_, _| Ok(()));
        let system = set.iter().next().unwrap().clone();

        let mut allocator = EntityAllocator::new();
        let mut commands = CommandBuffer::new();
        let mut ctx = SystemContext::new(RuntimeId(1), 0, &mut allocator, &mut commands);
        let mut value: Box<EntityValue> = Box::new(7_u32);
        assert!((system.handler)(value.as_mut(), &mut ctx).is_err());
    }

    #[test]
    fn test_event_handlers() {
        let mut set = EventSystemSet::new();
        set.subscribe::<Ping, _>(|ping| {
            anyhow::ensure!(ping.0 == 3, "unexpected ping");
            Ok(())
        })
        .subscribe_async::<Ping, _, _>(|ping| async move {
            anyhow::ensure!(ping.0 == 3, "unexpected ping");
            Ok(())
        });
        assert_eq!(set.len(), 2);

        let sync = &set.sync_subscribers()[0];
        assert_eq!(sync.type_identity, Ping::type_identity());
        assert!((sync.handler)(&Ping(3)).is_ok());
        assert!((sync.handler)(&Ping(4)).is_err());

        let payload: Arc<EventPayload> = Arc::new(Ping(3));
        let fut = (set.async_subscribers()[0].handler)(payload);
        assert!(futures::executor::block_on(fut).is_ok());
    }

    #[test]
    fn test_system_kind_labels() {
        assert_eq!(SystemKind::LateUpdate.to_string(), "late_update");
        assert_eq!(SystemKind::ALL.len(), 5);
    }
}
