//! A single scene: its world, its two dispatch engines and its sphere table.
//!
//! A [`Scene`] is plain single-threaded state. It is owned by one task (see
//! [`SceneRunner`](crate::SceneRunner)) and every mutation, including the
//! application of manifest loads and unloads, arrives as work on that task.
//! Nothing here locks.
//!
//! Structural changes requested by handlers are buffered while a dispatch is
//! in flight and applied in FIFO order once it returns. For a tick that means
//! after the whole update pass, so an entity spawned or queued during update
//! `N` is first updated on tick `N + 1`.

use std::sync::Arc;

use engine_assembly::{ManifestId, ModuleManifest};
use engine_component::{
    Command, CommandBuffer, DisposableEvent, Disposal, Entity, Event, RuntimeId, TypeIdentity,
    World,
};
use engine_net::messages::SphereEventEnvelope;
use engine_net::{NetError, RemoteEventSink, RouteId};
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::SceneConfig;
use crate::entity_system::EntityDispatchEngine;
use crate::error::SceneError;
use crate::event_system::EventDispatchEngine;
use crate::sphere::SphereEventTable;

/// One scene's runtime state.
pub struct Scene {
    name: String,
    scene_id: u64,
    world: World,
    commands: CommandBuffer,
    entity_systems: EntityDispatchEngine,
    event_systems: EventDispatchEngine,
    sphere_events: SphereEventTable,
    remote: Option<Arc<dyn RemoteEventSink>>,
    tick_id: u64,
    closed: bool,
}

impl Scene {
    /// Create an empty scene.
    #[must_use]
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            name: config.name.clone(),
            scene_id: config.scene_id,
            world: World::new(),
            commands: CommandBuffer::new(),
            entity_systems: EntityDispatchEngine::new(),
            event_systems: EventDispatchEngine::new(),
            sphere_events: SphereEventTable::new(),
            remote: None,
            tick_id: 0,
            closed: false,
        }
    }

    /// Deliver sphere events through `sink`.
    #[must_use]
    pub fn with_remote_sink(mut self, sink: Arc<dyn RemoteEventSink>) -> Self {
        self.remote = Some(sink);
        self
    }

    /// Returns the scene name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the scene id.
    #[must_use]
    pub fn scene_id(&self) -> u64 {
        self.scene_id
    }

    /// Returns the number of ticks run so far.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns `true` once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read access to the entity store.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Typed read access to one entity.
    #[must_use]
    pub fn entity<T: Entity>(&self, id: RuntimeId) -> Option<&T> {
        self.world.get(id)
    }

    /// Typed write access to one entity.
    #[must_use]
    pub fn entity_mut<T: Entity>(&mut self, id: RuntimeId) -> Option<&mut T> {
        self.world.get_mut(id)
    }

    /// The scene's entity dispatch engine.
    #[must_use]
    pub fn entity_systems(&self) -> &EntityDispatchEngine {
        &self.entity_systems
    }

    /// The scene's event dispatch engine.
    #[must_use]
    pub fn event_systems(&self) -> &EventDispatchEngine {
        &self.event_systems
    }

    /// The scene's sphere-event subscriptions.
    #[must_use]
    pub fn sphere_events(&self) -> &SphereEventTable {
        &self.sphere_events
    }

    // ── Manifests ───────────────────────────────────────────────────────────

    /// Apply a manifest's entity systems. Returns the number of handlers.
    pub fn load_entity_systems(&mut self, manifest: &ModuleManifest) -> usize {
        self.entity_systems.load(manifest)
    }

    /// Retract a manifest's entity systems.
    pub fn unload_entity_systems(&mut self, id: ManifestId) -> bool {
        self.entity_systems.unload(id)
    }

    /// Apply a manifest's event systems. Returns the number of subscribers.
    pub fn load_event_systems(&mut self, manifest: &ModuleManifest) -> usize {
        self.event_systems.load(manifest)
    }

    /// Retract a manifest's event systems.
    pub fn unload_event_systems(&mut self, id: ManifestId) -> bool {
        self.event_systems.unload(id)
    }

    // ── Entities ────────────────────────────────────────────────────────────

    /// Store a new entity and run its awake handlers.
    pub fn spawn<T: Entity>(&mut self, value: T) -> RuntimeId {
        let id = self.world.insert(value);
        self.entity_systems
            .awake(&mut self.world, &mut self.commands, self.tick_id, id);
        self.apply_commands();
        id
    }

    /// Decode a stored entity and run its deserialize handlers.
    ///
    /// Awake handlers do not run for a restored entity.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Codec`] if the bytes are not a valid `T`.
    pub fn deserialize_entity<T>(&mut self, bytes: &[u8]) -> Result<RuntimeId, SceneError>
    where
        T: Entity + DeserializeOwned,
    {
        let value: T = engine_net::decode(bytes)?;
        let id = self.world.insert(value);
        self.entity_systems
            .deserialize(&mut self.world, &mut self.commands, self.tick_id, id);
        self.apply_commands();
        Ok(id)
    }

    /// Dispose an entity: destroy handlers run, then it leaves the world.
    ///
    /// Queue entries are not touched; the next pass drops them. Returns
    /// `false` if the entity is unknown or already disposed.
    pub fn destroy(&mut self, id: RuntimeId) -> bool {
        let destroyed = self.destroy_now(id);
        self.apply_commands();
        destroyed
    }

    /// Queue an entity for updates. No-op if its type has no update handler.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownEntity`] if the entity is not alive.
    pub fn register_update(&mut self, id: RuntimeId) -> Result<bool, SceneError> {
        let type_identity = self.live_type(id)?;
        Ok(self.entity_systems.register_update(id, type_identity))
    }

    /// Take an entity off the update queue.
    pub fn unregister_update(&mut self, id: RuntimeId) -> bool {
        self.entity_systems.unregister_update(id)
    }

    /// Queue an entity for late updates. No-op if its type has no handler.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownEntity`] if the entity is not alive.
    pub fn register_late_update(&mut self, id: RuntimeId) -> Result<bool, SceneError> {
        let type_identity = self.live_type(id)?;
        Ok(self.entity_systems.register_late_update(id, type_identity))
    }

    /// Take an entity off the late-update queue.
    pub fn unregister_late_update(&mut self, id: RuntimeId) -> bool {
        self.entity_systems.unregister_late_update(id)
    }

    /// Re-queue every live entity whose type has update or late-update
    /// handlers.
    ///
    /// Unloading a manifest prunes the queues of its entity types, and so
    /// does the rollback half of a reload. Hosts call this after a reload to
    /// put surviving entities back. Returns how many entries were added.
    pub fn resume_updates(&mut self) -> usize {
        let mut ids: Vec<RuntimeId> = self.world.ids().collect();
        ids.sort_unstable();
        let mut queued = 0;
        for id in ids {
            let Ok(type_identity) = self.live_type(id) else {
                continue;
            };
            queued += usize::from(self.entity_systems.register_update(id, type_identity));
            queued += usize::from(self.entity_systems.register_late_update(id, type_identity));
        }
        debug!(scene = %self.name, queued, "updates resumed");
        queued
    }

    // ── Ticking ─────────────────────────────────────────────────────────────

    /// Run one update pass and apply what it recorded.
    pub fn update(&mut self) -> usize {
        let dispatched =
            self.entity_systems
                .update(&mut self.world, &mut self.commands, self.tick_id);
        self.apply_commands();
        dispatched
    }

    /// Run one late-update pass and apply what it recorded.
    pub fn late_update(&mut self) -> usize {
        let dispatched =
            self.entity_systems
                .late_update(&mut self.world, &mut self.commands, self.tick_id);
        self.apply_commands();
        dispatched
    }

    /// Advance the tick counter, then run update and late update.
    ///
    /// Returns the number of entities dispatched across both passes.
    pub fn tick(&mut self) -> usize {
        self.tick_id += 1;
        self.update() + self.late_update()
    }

    // ── Events ──────────────────────────────────────────────────────────────

    /// Deliver an event to its synchronous subscribers. Returns failures.
    pub fn publish<E: Event>(&self, event: &E) -> usize {
        self.event_systems.publish(event)
    }

    /// Deliver a disposable event, disposing it afterwards when `Auto`.
    pub fn publish_disposable<E: DisposableEvent>(&self, event: &E, disposal: Disposal) -> usize {
        self.event_systems.publish_disposable(event, disposal)
    }

    /// Start every async subscriber of an event.
    ///
    /// The returned future does not borrow the scene; await it elsewhere so
    /// the scene keeps running while handlers are pending.
    pub fn publish_async<E: Event>(&self, event: E) -> BoxFuture<'static, usize> {
        self.event_systems.publish_async(event)
    }

    /// Async counterpart of [`publish_disposable`](Self::publish_disposable).
    pub fn publish_disposable_async<E: DisposableEvent>(
        &self,
        event: Arc<E>,
        disposal: Disposal,
    ) -> BoxFuture<'static, usize> {
        self.event_systems.publish_disposable_async(event, disposal)
    }

    // ── Sphere events ───────────────────────────────────────────────────────

    /// Record that a remote route wants events of a type.
    pub fn subscribe_sphere_event(
        &mut self,
        route_id: RouteId,
        type_identity: TypeIdentity,
    ) -> bool {
        let added = self.sphere_events.subscribe(route_id, type_identity);
        debug!(
            scene = %self.name,
            route_id = %route_id,
            type_identity = %type_identity,
            added,
            "sphere event subscribed"
        );
        added
    }

    /// Forget a remote route's interest in a type.
    pub fn unsubscribe_sphere_event(
        &mut self,
        route_id: RouteId,
        type_identity: TypeIdentity,
    ) -> bool {
        let removed = self.sphere_events.unsubscribe(route_id, type_identity);
        debug!(
            scene = %self.name,
            route_id = %route_id,
            type_identity = %type_identity,
            removed,
            "sphere event unsubscribed"
        );
        removed
    }

    /// Drop every subscription held by a remote route.
    pub fn remove_sphere_route(&mut self, route_id: RouteId) -> usize {
        let removed = self.sphere_events.remove_route(route_id);
        debug!(scene = %self.name, route_id = %route_id, removed, "sphere route removed");
        removed
    }

    /// Encode an event once and hand a copy to every subscribed route.
    ///
    /// Every route is attempted even if an earlier one fails. A route the
    /// sink reports as closed is removed from the table and is not counted
    /// as a failure. Returns the number of envelopes accepted by the sink;
    /// with no sink attached, nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Codec`] if the event cannot be encoded, or
    /// [`SceneError::Remote`] naming the first route the sink refused.
    pub fn publish_sphere<E: Event + Serialize>(
        &mut self,
        event: &E,
    ) -> Result<usize, SceneError> {
        let type_identity = E::type_identity();
        let routes = self.sphere_events.subscribers(type_identity).to_vec();
        if routes.is_empty() {
            return Ok(0);
        }
        let Some(remote) = self.remote.clone() else {
            debug!(
                scene = %self.name,
                type_identity = %type_identity,
                "no remote sink; sphere event dropped"
            );
            return Ok(0);
        };
        let payload = engine_net::encode(event)?;
        let mut delivered = 0;
        let mut closed = Vec::new();
        let mut first_failure = None;
        for route_id in routes {
            let envelope = SphereEventEnvelope {
                route_id,
                type_hash: type_identity,
                payload: payload.clone(),
            };
            match remote.deliver(envelope) {
                Ok(()) => delivered += 1,
                Err(NetError::RouteClosed(_)) => closed.push(route_id),
                Err(e) => {
                    warn!(
                        scene = %self.name,
                        route_id = %route_id,
                        type_name = E::type_name(),
                        error = %e,
                        "sphere event delivery failed"
                    );
                    if first_failure.is_none() {
                        first_failure = Some(SceneError::Remote { route_id, source: e });
                    }
                }
            }
        }
        for route_id in closed {
            self.remove_sphere_route(route_id);
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(delivered),
        }
    }

    // ── Teardown ────────────────────────────────────────────────────────────

    /// Destroy every live entity and drop all handlers and subscriptions.
    ///
    /// Commands recorded by destroy handlers are discarded.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let mut ids: Vec<RuntimeId> = self.world.ids().collect();
        ids.sort_unstable();
        for id in ids {
            self.destroy_now(id);
        }
        self.commands.clear();
        self.world.clear();
        self.entity_systems.clear();
        self.event_systems.clear();
        self.sphere_events.clear();
        self.closed = true;
        info!(scene = %self.name, scene_id = self.scene_id, "scene closed");
    }

    fn live_type(&self, id: RuntimeId) -> Result<TypeIdentity, SceneError> {
        if !self.world.is_alive(id) {
            return Err(SceneError::UnknownEntity(id));
        }
        self.world
            .type_identity(id)
            .ok_or(SceneError::UnknownEntity(id))
    }

    fn destroy_now(&mut self, id: RuntimeId) -> bool {
        if !self.world.is_alive(id) {
            return false;
        }
        self.world.mark_disposed(id);
        self.entity_systems
            .destroy(&mut self.world, &mut self.commands, self.tick_id, id);
        self.world.remove(id);
        true
    }

    fn apply_commands(&mut self) {
        while let Some(command) = self.commands.pop() {
            match command {
                Command::Spawn { id, slot } => {
                    self.world.insert_slot(id, slot);
                    self.entity_systems
                        .awake(&mut self.world, &mut self.commands, self.tick_id, id);
                }
                Command::Destroy(id) => {
                    self.destroy_now(id);
                }
                Command::RegisterUpdate(id) => {
                    if let Ok(ty) = self.live_type(id) {
                        self.entity_systems.register_update(id, ty);
                    }
                }
                Command::UnregisterUpdate(id) => {
                    self.entity_systems.unregister_update(id);
                }
                Command::RegisterLateUpdate(id) => {
                    if let Ok(ty) = self.live_type(id) {
                        self.entity_systems.register_late_update(id, ty);
                    }
                }
                Command::UnregisterLateUpdate(id) => {
                    self.entity_systems.unregister_late_update(id);
                }
            }
        }
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("scene_id", &self.scene_id)
            .field("tick_id", &self.tick_id)
            .field("entities", &self.world.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
