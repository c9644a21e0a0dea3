//! Per-scene entity dispatch.
//!
//! [`EntityDispatchEngine`] holds one handler table per [`SystemKind`] and
//! the update / late-update queues. Every table entry is tagged with the
//! manifest that contributed it, so unloading a manifest removes exactly its
//! own handlers and leaves other modules' handlers for the same type alone.
//!
//! The engine is plain data owned by a [`Scene`](crate::Scene); the scene's
//! execution context is what serialises loads, unloads and ticks.

use std::collections::HashMap;

use engine_assembly::{EntityHandler, EntitySystemSet, ManifestId, ModuleManifest, SystemKind};
use engine_component::{CommandBuffer, RuntimeId, SystemContext, TypeIdentity, World};
use tracing::{debug, error, info};

use crate::error::isolate;
use crate::update_queue::UpdateQueue;

struct Contribution {
    owner: ManifestId,
    handler: EntityHandler,
}

#[derive(Default)]
struct HandlerTable {
    by_type: HashMap<TypeIdentity, Vec<Contribution>>,
}

impl HandlerTable {
    fn insert(&mut self, owner: ManifestId, type_identity: TypeIdentity, handler: EntityHandler) {
        self.by_type
            .entry(type_identity)
            .or_default()
            .push(Contribution { owner, handler });
    }

    fn remove_owner(&mut self, owner: ManifestId) -> usize {
        let mut removed = 0;
        self.by_type.retain(|_, list| {
            let before = list.len();
            list.retain(|c| c.owner != owner);
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }

    fn get(&self, type_identity: TypeIdentity) -> Option<&[Contribution]> {
        self.by_type.get(&type_identity).map(Vec::as_slice)
    }

    fn contains(&self, type_identity: TypeIdentity) -> bool {
        self.by_type.contains_key(&type_identity)
    }
}

const fn table_index(kind: SystemKind) -> usize {
    match kind {
        SystemKind::Awake => 0,
        SystemKind::Update => 1,
        SystemKind::Destroy => 2,
        SystemKind::Deserialize => 3,
        SystemKind::LateUpdate => 4,
    }
}

/// Entity handler tables and update queues of one scene.
#[derive(Default)]
pub struct EntityDispatchEngine {
    /// Applied manifests, in load order.
    applied: Vec<ManifestId>,
    tables: [HandlerTable; 5],
    update_queue: UpdateQueue,
    late_update_queue: UpdateQueue,
}

impl EntityDispatchEngine {
    /// Create an engine with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: SystemKind) -> &HandlerTable {
        &self.tables[table_index(kind)]
    }

    // ── Load / unload ───────────────────────────────────────────────────────

    /// Merge a manifest's entity handlers.
    ///
    /// A manifest that is already applied is rolled back first, so loading
    /// the same id twice leaves the same tables as loading it once. A cleared
    /// manifest, or one without an entity system registrar, contributes
    /// nothing. Returns the number of handlers merged.
    pub fn load(&mut self, manifest: &ModuleManifest) -> usize {
        let id = manifest.id();
        if self.is_applied(id) {
            self.unload(id);
        }

        let Some(registrar) = manifest.registrars().and_then(|r| r.entity_systems.clone()) else {
            debug!(manifest = manifest.name(), "manifest has no entity systems");
            return 0;
        };
        let mut systems = EntitySystemSet::new();
        if let Err(fault) = isolate(|| {
            registrar.register_systems(&mut systems);
            Ok(())
        }) {
            error!(manifest = manifest.name(), error = %fault, "entity system registrar failed");
            return 0;
        }

        let count = systems.len();
        for system in systems {
            self.tables[table_index(system.kind)].insert(id, system.type_identity, system.handler);
        }
        self.applied.push(id);
        info!(manifest = manifest.name(), handlers = count, "entity systems loaded");
        count
    }

    /// Remove every handler a manifest contributed and prune the queues.
    ///
    /// Queue entries whose type no longer has an update (or late-update)
    /// handler are dropped. The entities themselves are left alone. Returns
    /// `false` if the manifest was not applied.
    pub fn unload(&mut self, id: ManifestId) -> bool {
        let Some(position) = self.applied.iter().position(|applied| *applied == id) else {
            return false;
        };
        self.applied.remove(position);

        let removed: usize = self.tables.iter_mut().map(|t| t.remove_owner(id)).sum();
        let update = &self.tables[table_index(SystemKind::Update)];
        let late = &self.tables[table_index(SystemKind::LateUpdate)];
        let pruned = self.update_queue.retain(|_, ty| update.contains(ty))
            + self.late_update_queue.retain(|_, ty| late.contains(ty));

        info!(manifest_id = %id, handlers = removed, pruned, "entity systems unloaded");
        true
    }

    /// Returns `true` if the manifest's handlers are merged.
    #[must_use]
    pub fn is_applied(&self, id: ManifestId) -> bool {
        self.applied.contains(&id)
    }

    /// Applied manifests in load order.
    #[must_use]
    pub fn applied(&self) -> &[ManifestId] {
        &self.applied
    }

    /// Returns `true` if any handler of `kind` exists for the type.
    #[must_use]
    pub fn has_handler(&self, kind: SystemKind, type_identity: TypeIdentity) -> bool {
        self.table(kind).contains(type_identity)
    }

    /// Number of handlers of `kind` registered for the type.
    #[must_use]
    pub fn handler_count(&self, kind: SystemKind, type_identity: TypeIdentity) -> usize {
        self.table(kind).get(type_identity).map_or(0, <[_]>::len)
    }

    // ── One-shot hooks ──────────────────────────────────────────────────────

    /// Run the awake handlers of an entity. Returns how many ran.
    pub fn awake(
        &self,
        world: &mut World,
        commands: &mut CommandBuffer,
        tick_id: u64,
        id: RuntimeId,
    ) -> usize {
        self.dispatch(SystemKind::Awake, world, commands, tick_id, id)
    }

    /// Run the destroy handlers of an entity. Returns how many ran.
    pub fn destroy(
        &self,
        world: &mut World,
        commands: &mut CommandBuffer,
        tick_id: u64,
        id: RuntimeId,
    ) -> usize {
        self.dispatch(SystemKind::Destroy, world, commands, tick_id, id)
    }

    /// Run the deserialize handlers of an entity. Returns how many ran.
    pub fn deserialize(
        &self,
        world: &mut World,
        commands: &mut CommandBuffer,
        tick_id: u64,
        id: RuntimeId,
    ) -> usize {
        self.dispatch(SystemKind::Deserialize, world, commands, tick_id, id)
    }

    fn dispatch(
        &self,
        kind: SystemKind,
        world: &mut World,
        commands: &mut CommandBuffer,
        tick_id: u64,
        id: RuntimeId,
    ) -> usize {
        let Some(type_identity) = world.type_identity(id) else {
            return 0;
        };
        invoke(self.table(kind), kind, world, commands, tick_id, id, type_identity)
    }

    // ── Queues ──────────────────────────────────────────────────────────────

    /// Queue an entity for per-tick updates.
    ///
    /// No-op (returns `false`) if the type has no update handler or the
    /// entity is already queued.
    pub fn register_update(&mut self, id: RuntimeId, type_identity: TypeIdentity) -> bool {
        if !self.has_handler(SystemKind::Update, type_identity) {
            debug!(entity = %id, type_identity = %type_identity, "no update handler; not queued");
            return false;
        }
        self.update_queue.push_back(id, type_identity)
    }

    /// Take an entity off the update queue.
    pub fn unregister_update(&mut self, id: RuntimeId) -> bool {
        self.update_queue.remove(id)
    }

    /// Queue an entity for per-tick late updates.
    ///
    /// Same contract as [`register_update`](Self::register_update).
    pub fn register_late_update(&mut self, id: RuntimeId, type_identity: TypeIdentity) -> bool {
        if !self.has_handler(SystemKind::LateUpdate, type_identity) {
            debug!(
                entity = %id,
                type_identity = %type_identity,
                "no late-update handler; not queued"
            );
            return false;
        }
        self.late_update_queue.push_back(id, type_identity)
    }

    /// Take an entity off the late-update queue.
    pub fn unregister_late_update(&mut self, id: RuntimeId) -> bool {
        self.late_update_queue.remove(id)
    }

    /// Returns `true` if the entity is on the update queue.
    #[must_use]
    pub fn is_queued_for_update(&self, id: RuntimeId) -> bool {
        self.update_queue.contains(id)
    }

    /// Returns `true` if the entity is on the late-update queue.
    #[must_use]
    pub fn is_queued_for_late_update(&self, id: RuntimeId) -> bool {
        self.late_update_queue.contains(id)
    }

    /// Number of entities on the update queue.
    #[must_use]
    pub fn update_len(&self) -> usize {
        self.update_queue.len()
    }

    /// Number of entities on the late-update queue.
    #[must_use]
    pub fn late_update_len(&self) -> usize {
        self.late_update_queue.len()
    }

    /// Run one update pass. Returns the number of entities dispatched.
    ///
    /// Exactly the entries queued on entry are visited; anything queued while
    /// the pass runs waits for the next one.
    pub fn update(
        &mut self,
        world: &mut World,
        commands: &mut CommandBuffer,
        tick_id: u64,
    ) -> usize {
        let table = &self.tables[table_index(SystemKind::Update)];
        run_queue(
            table,
            SystemKind::Update,
            &mut self.update_queue,
            world,
            commands,
            tick_id,
        )
    }

    /// Run one late-update pass. Same contract as [`update`](Self::update).
    pub fn late_update(
        &mut self,
        world: &mut World,
        commands: &mut CommandBuffer,
        tick_id: u64,
    ) -> usize {
        let table = &self.tables[table_index(SystemKind::LateUpdate)];
        run_queue(
            table,
            SystemKind::LateUpdate,
            &mut self.late_update_queue,
            world,
            commands,
            tick_id,
        )
    }

    /// Drop every handler and queue entry.
    pub fn clear(&mut self) {
        self.applied.clear();
        self.tables = Default::default();
        self.update_queue.clear();
        self.late_update_queue.clear();
    }
}

impl std::fmt::Debug for EntityDispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDispatchEngine")
            .field("applied", &self.applied)
            .field("update_queue", &self.update_queue.len())
            .field("late_update_queue", &self.late_update_queue.len())
            .finish_non_exhaustive()
    }
}

fn run_queue(
    table: &HandlerTable,
    kind: SystemKind,
    queue: &mut UpdateQueue,
    world: &mut World,
    commands: &mut CommandBuffer,
    tick_id: u64,
) -> usize {
    let count = queue.len();
    let mut dispatched = 0;
    for _ in 0..count {
        let Some((id, type_identity)) = queue.pop_front() else {
            break;
        };
        if !world.is_alive(id) {
            debug!(entity = %id, kind = %kind, "entity gone; dropped from queue");
            continue;
        }
        queue.push_back(id, type_identity);
        // Pruned on unload; a missing handler here is skipped, not removed.
        if !table.contains(type_identity) {
            continue;
        }
        invoke(table, kind, world, commands, tick_id, id, type_identity);
        dispatched += 1;
    }
    dispatched
}

fn invoke(
    table: &HandlerTable,
    kind: SystemKind,
    world: &mut World,
    commands: &mut CommandBuffer,
    tick_id: u64,
    id: RuntimeId,
    type_identity: TypeIdentity,
) -> usize {
    let Some(contributions) = table.get(type_identity) else {
        return 0;
    };
    let Some((slot, allocator)) = world.split_mut(id) else {
        return 0;
    };
    let type_name = slot.type_name;
    let mut ctx = SystemContext::new(id, tick_id, allocator, commands);
    for contribution in contributions {
        if let Err(fault) = isolate(|| (contribution.handler)(slot.value.as_mut(), &mut ctx)) {
            error!(
                entity = %id,
                type_identity = %type_identity,
                type_name,
                kind = %kind,
                manifest_id = %contribution.owner,
                error = %fault,
                "entity handler failed"
            );
        }
    }
    contributions.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use engine_component::{Command, Entity, TypeName};
    use parking_lot::Mutex;

    struct Ship {
        hits: u32,
    }

    impl TypeName for Ship {
        fn type_name() -> &'static str {
            "test::Ship"
        }
    }

    impl Entity for Ship {}

    struct Rock;

    impl TypeName for Rock {
        fn type_name() -> &'static str {
            "test::Rock"
        }
    }

    impl Entity for Rock {}

    fn manifest(
        name: &str,
        register: impl Fn(&mut EntitySystemSet) + Send + Sync + 'static,
    ) -> ModuleManifest {
        ModuleManifest::builder(name).entity_systems(register).build()
    }

    fn counting(name: &str, counter: Arc<AtomicUsize>) -> ModuleManifest {
        manifest(name, move |systems| {
            let counter = Arc::clone(&counter);
            systems.update::<Ship, _>(move |ship, _| {
                ship.hits += 1;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        })
    }

    struct Fixture {
        engine: EntityDispatchEngine,
        world: World,
        commands: CommandBuffer,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: EntityDispatchEngine::new(),
                world: World::new(),
                commands: CommandBuffer::new(),
            }
        }

        fn ship(&mut self) -> RuntimeId {
            let id = self.world.insert(Ship { hits: 0 });
            self.engine.register_update(id, Ship::type_identity());
            id
        }

        fn update(&mut self) -> usize {
            self.engine.update(&mut self.world, &mut self.commands, 1)
        }
    }

    #[test]
    fn test_reload_is_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut fx = Fixture::new();
        let m = counting("a", Arc::clone(&counter));
        fx.engine.load(&m);
        fx.ship();
        fx.engine.load(&m);

        assert_eq!(fx.engine.handler_count(SystemKind::Update, Ship::type_identity()), 1);
        assert_eq!(fx.engine.applied(), &[m.id()]);
        // The reload rolled back the only update handler, which pruned the queue.
        assert_eq!(fx.engine.update_len(), 0);

        fx.ship();
        assert_eq!(fx.update(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reload_matches_unload_then_load() {
        let mut twice = EntityDispatchEngine::new();
        let mut cycled = EntityDispatchEngine::new();
        let m = counting("a", Arc::default());

        twice.load(&m);
        twice.load(&m);
        cycled.load(&m);
        cycled.unload(m.id());
        cycled.load(&m);

        for kind in SystemKind::ALL {
            assert_eq!(
                twice.handler_count(kind, Ship::type_identity()),
                cycled.handler_count(kind, Ship::type_identity())
            );
        }
        assert_eq!(twice.applied(), cycled.applied());
    }

    #[test]
    fn test_tick_visits_only_entries_present_at_start() {
        let mut fx = Fixture::new();
        fx.engine.load(&manifest("spawner", |systems| {
            systems.update::<Ship, _>(|_, ctx| {
                let child = ctx.spawn(Ship { hits: 0 });
                ctx.register_update(child);
                Ok(())
            });
        }));
        for _ in 0..3 {
            fx.ship();
        }

        assert_eq!(fx.update(), 3);
        assert_eq!(fx.engine.update_len(), 3);
        // Every handler deferred one spawn and one registration.
        assert_eq!(fx.commands.len(), 6);
        assert!(matches!(fx.commands.pop(), Some(Command::Spawn { .. })));
    }

    #[test]
    fn test_dead_entities_are_pruned_on_visit() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut fx = Fixture::new();
        fx.engine.load(&counting("a", Arc::clone(&counter)));
        let removed = fx.ship();
        let disposed = fx.ship();
        let alive = fx.ship();

        fx.world.remove(removed);
        fx.world.mark_disposed(disposed);
        assert_eq!(fx.update(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(fx.engine.update_len(), 1);
        assert!(fx.engine.is_queued_for_update(alive));
        assert!(!fx.engine.is_queued_for_update(removed));
        assert!(!fx.engine.is_queued_for_update(disposed));
    }

    #[test]
    fn test_unload_removes_only_own_handlers() {
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));
        let mut fx = Fixture::new();
        let a = counting("a", Arc::clone(&a_calls));
        let b = counting("b", Arc::clone(&b_calls));
        fx.engine.load(&a);
        fx.engine.load(&b);
        let ship = fx.ship();

        fx.update();
        assert_eq!((a_calls.load(Ordering::SeqCst), b_calls.load(Ordering::SeqCst)), (1, 1));

        assert!(fx.engine.unload(a.id()));
        assert!(!fx.engine.unload(a.id()));
        fx.update();
        assert_eq!((a_calls.load(Ordering::SeqCst), b_calls.load(Ordering::SeqCst)), (1, 2));
        assert!(fx.engine.is_queued_for_update(ship));

        fx.engine.unload(b.id());
        assert!(!fx.engine.has_handler(SystemKind::Update, Ship::type_identity()));
        assert_eq!(fx.engine.update_len(), 0);
        assert!(!fx.engine.register_update(ship, Ship::type_identity()));
        assert!(fx.world.is_alive(ship));
    }

    #[test]
    fn test_handlers_run_in_load_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tagged = |name: &'static str, log: Arc<Mutex<Vec<&'static str>>>| {
            manifest(name, move |systems| {
                let log = Arc::clone(&log);
                systems.awake::<Ship, _>(move |_, _| {
                    log.lock().push(name);
                    Ok(())
                });
            })
        };
        let a = tagged("a", Arc::clone(&log));
        let b = tagged("b", Arc::clone(&log));
        let mut fx = Fixture::new();
        fx.engine.load(&a);
        fx.engine.load(&b);

        let ship = fx.world.insert(Ship { hits: 0 });
        fx.engine.awake(&mut fx.world, &mut fx.commands, 0, ship);
        assert_eq!(*log.lock(), vec!["a", "b"]);

        // Reloading `a` moves its contribution behind `b`.
        fx.engine.load(&a);
        log.lock().clear();
        fx.engine.awake(&mut fx.world, &mut fx.commands, 0, ship);
        assert_eq!(*log.lock(), vec!["b", "a"]);
    }

    #[test]
    fn test_failing_handlers_are_isolated() {
        let mut fx = Fixture::new();
        fx.engine.load(&manifest("flaky", |systems| {
            systems.update::<Ship, _>(|ship, ctx| {
                ship.hits += 1;
                match ctx.entity().id() {
                    1 => anyhow::bail!("broken ship"),
                    2 => panic!("very broken ship"),
                    _ => Ok(()),
                }
            });
        }));
        let first = fx.ship();
        let second = fx.ship();
        let third = fx.ship();

        assert_eq!(fx.update(), 3);
        for id in [first, second, third] {
            assert_eq!(fx.world.get::<Ship>(id).unwrap().hits, 1);
            assert!(fx.engine.is_queued_for_update(id));
        }
    }

    #[test]
    fn test_hooks_without_handlers_are_noops() {
        let mut fx = Fixture::new();
        fx.engine.load(&counting("a", Arc::default()));
        let rock = fx.world.insert(Rock);

        assert_eq!(fx.engine.awake(&mut fx.world, &mut fx.commands, 0, rock), 0);
        assert_eq!(fx.engine.destroy(&mut fx.world, &mut fx.commands, 0, rock), 0);
        assert!(!fx.engine.register_update(rock, Rock::type_identity()));
        assert!(!fx.engine.register_late_update(rock, Rock::type_identity()));
        assert_eq!(
            fx.engine.awake(&mut fx.world, &mut fx.commands, 0, RuntimeId(999)),
            0
        );
    }

    #[test]
    fn test_cleared_manifest_contributes_nothing() {
        let mut fx = Fixture::new();
        let m = counting("a", Arc::default());
        m.clear();
        assert_eq!(fx.engine.load(&m), 0);
        assert!(!fx.engine.is_applied(m.id()));
    }
}
