//! The process-wide manifest registry.
//!
//! [`ManifestRegistry`] is a cheap `Clone` handle around shared state: a
//! concurrent map of loaded manifests, a per-id reload gate, and the
//! [`LifecycleBroadcaster`]. Registering and unregistering are async because
//! every subscriber is notified, and awaited, before the call returns.

use std::sync::Arc;

use dashmap::DashMap;
use engine_component::TypeIdentity;
use engine_net::OpCode;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::interface::{CustomInterface, InterfaceImpl};
use crate::lifecycle::LifecycleBroadcaster;
use crate::manifest::{ManifestId, ModuleManifest};

#[derive(Default)]
struct RegistryInner {
    manifests: DashMap<ManifestId, Arc<ModuleManifest>>,
    /// Serialises register/unregister per id. Distinct ids never contend.
    /// Only ids with a reload in flight have an entry.
    gates: DashMap<ManifestId, Arc<Mutex<()>>>,
    lifecycle: LifecycleBroadcaster,
}

/// Shared registry of loaded module manifests.
#[derive(Clone, Default)]
pub struct ManifestRegistry {
    inner: Arc<RegistryInner>,
}

/// Holds one id's reload gate. The gate entry is dropped from the map once
/// no other task is holding or waiting on it.
struct ReloadGuard<'a> {
    gates: &'a DashMap<ManifestId, Arc<Mutex<()>>>,
    id: ManifestId,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        self.gates.remove_if(&self.id, |_, gate| Arc::strong_count(gate) == 1);
    }
}

impl ManifestRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The subscriber set notified on load and unload.
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleBroadcaster {
        &self.inner.lifecycle
    }

    async fn lock(&self, id: ManifestId) -> ReloadGuard<'_> {
        let gate = Arc::clone(&self.inner.gates.entry(id).or_default());
        ReloadGuard {
            gates: &self.inner.gates,
            id,
            held: Some(gate.lock_owned().await),
        }
    }

    /// Register a manifest, replacing any manifest with the same id.
    ///
    /// A replaced manifest is fully unloaded (every subscriber has rolled it
    /// back and it has been cleared) before the new one is stored, its custom
    /// interfaces populated, and every subscriber told to load it.
    pub async fn register(&self, manifest: ModuleManifest) -> Arc<ModuleManifest> {
        let id = manifest.id();
        let _reload = self.lock(id).await;

        if let Some((_, previous)) = self.inner.manifests.remove(&id) {
            info!(manifest = previous.name(), id = %id, "replacing loaded manifest");
            self.unload(&previous).await;
        }

        manifest.register_interfaces();
        let manifest = Arc::new(manifest);
        self.inner.manifests.insert(id, Arc::clone(&manifest));

        let failed = self.inner.lifecycle.on_load(&manifest).await;
        info!(
            manifest = manifest.name(),
            id = %id,
            subscribers = self.inner.lifecycle.len(),
            failed,
            "manifest registered"
        );
        manifest
    }

    /// Unregister a manifest. Returns `false` if the id was not loaded.
    pub async fn unregister(&self, id: ManifestId) -> bool {
        if !self.contains(id) {
            debug!(id = %id, "unregister of unknown manifest ignored");
            return false;
        }
        let _reload = self.lock(id).await;

        let Some((_, manifest)) = self.inner.manifests.remove(&id) else {
            debug!(id = %id, "unregister of unknown manifest ignored");
            return false;
        };
        self.unload(&manifest).await;
        info!(manifest = manifest.name(), id = %id, "manifest unregistered");
        true
    }

    async fn unload(&self, manifest: &Arc<ModuleManifest>) {
        let failed = self.inner.lifecycle.on_unload(manifest).await;
        if failed > 0 {
            warn!(manifest = manifest.name(), failed, "some subscribers failed to unload");
        }
        manifest.unregister_interfaces();
        manifest.clear();
    }

    /// Unload every manifest, empty the registry and detach all subscribers.
    ///
    /// Manifests are drained one at a time under their reload gate, and the
    /// drain repeats until the map is empty, so a manifest registered while
    /// an earlier unload is in flight is still unloaded and cleared.
    pub async fn dispose(&self) {
        let mut count = 0;
        loop {
            let ids: Vec<ManifestId> = self.inner.manifests.iter().map(|e| *e.key()).collect();
            if ids.is_empty() {
                break;
            }
            for id in ids {
                let _reload = self.lock(id).await;
                if let Some((_, manifest)) = self.inner.manifests.remove(&id) {
                    self.unload(&manifest).await;
                    count += 1;
                }
            }
        }
        self.inner.lifecycle.clear();
        info!(count, "manifest registry disposed");
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// The manifest with the given id.
    #[must_use]
    pub fn get(&self, id: ManifestId) -> Option<Arc<ModuleManifest>> {
        self.inner.manifests.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns `true` if the id is loaded.
    #[must_use]
    pub fn contains(&self, id: ManifestId) -> bool {
        self.inner.manifests.contains_key(&id)
    }

    /// Returns the number of loaded manifests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.manifests.len()
    }

    /// Returns `true` if nothing is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.manifests.is_empty()
    }

    /// Lazily iterate the loaded manifests.
    ///
    /// Safe to call while other tasks register or unregister; each manifest
    /// is yielded at most once, and ones added or removed mid-iteration may or
    /// may not appear. Do not hold the iterator across an `.await`.
    pub fn manifests(&self) -> impl Iterator<Item = Arc<ModuleManifest>> + '_ {
        self.inner
            .manifests
            .iter()
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Every implementation of interface `I` across loaded manifests.
    pub fn custom_interfaces<I: CustomInterface + ?Sized>(&self) -> Vec<InterfaceImpl> {
        self.manifests()
            .flat_map(|manifest| manifest.custom_interfaces::<I>())
            .collect()
    }

    /// The opcode of a protocol type, from the first module that knows it.
    #[must_use]
    pub fn opcode_of(&self, message_type: TypeIdentity) -> Option<OpCode> {
        self.manifests()
            .find_map(|m| m.registrars()?.opcodes.as_ref()?.opcode(message_type))
    }

    /// The protocol type of an opcode.
    #[must_use]
    pub fn message_type_of(&self, opcode: OpCode) -> Option<TypeIdentity> {
        self.manifests()
            .find_map(|m| m.registrars()?.opcodes.as_ref()?.message_type(opcode))
    }

    /// The response type of a request opcode.
    #[must_use]
    pub fn response_type_of(&self, request: OpCode) -> Option<TypeIdentity> {
        self.manifests()
            .find_map(|m| m.registrars()?.response_types.as_ref()?.response_type(request))
    }

    /// The manifest whose message handlers accept `opcode`.
    #[must_use]
    pub fn handler_manifest(&self, opcode: OpCode) -> Option<Arc<ModuleManifest>> {
        self.manifests().find(|m| {
            m.registrars()
                .and_then(|r| r.message_handlers.clone())
                .is_some_and(|resolver| resolver.handles(opcode))
        })
    }

    /// All protocol types declared by loaded modules.
    #[must_use]
    pub fn protocol_types(&self) -> Vec<TypeIdentity> {
        self.manifests()
            .filter_map(|m| m.registrars()?.network_protocol.clone())
            .flat_map(|r| r.protocol_types())
            .collect()
    }

    /// All entity types declared by loaded modules.
    #[must_use]
    pub fn entity_types(&self) -> Vec<TypeIdentity> {
        self.manifests()
            .filter_map(|m| m.registrars()?.entity_types.clone())
            .flat_map(|r| r.entity_types())
            .collect()
    }

    /// Entity types stored in a separate table from `owner`.
    #[cfg(feature = "server")]
    #[must_use]
    pub fn separate_tables_of(&self, owner: TypeIdentity) -> Vec<TypeIdentity> {
        self.manifests()
            .filter_map(|m| m.registrars()?.separate_tables.clone())
            .flat_map(|r| r.separate_tables())
            .filter(|(o, _)| *o == owner)
            .map(|(_, separate)| separate)
            .collect()
    }

    /// Event types allowed across processes.
    #[cfg(feature = "server")]
    #[must_use]
    pub fn sphere_event_types(&self) -> Vec<TypeIdentity> {
        self.manifests()
            .filter_map(|m| m.registrars()?.sphere_events.clone())
            .flat_map(|r| r.sphere_events())
            .collect()
    }
}

impl std::fmt::Debug for ManifestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestRegistry")
            .field("manifests", &self.len())
            .field("lifecycle", &self.inner.lifecycle)
            .finish()
    }
}
