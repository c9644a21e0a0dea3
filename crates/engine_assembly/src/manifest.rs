//! The runtime descriptor of one loaded module.
//!
//! A [`ModuleManifest`] is built by the loader, handed to the
//! [`ManifestRegistry`](crate::ManifestRegistry), and shared (`Arc`) with
//! every subscriber while it is loaded. When it is replaced or unregistered
//! its module handle and registrar set are cleared, so a subscriber that still
//! holds the `Arc` sees an empty manifest rather than stale code.

use std::any::Any;
use std::sync::Arc;

use engine_component::TypeIdentity;
use parking_lot::RwLock;

use crate::interface::{CustomInterface, InterfaceImpl, InterfaceTable};
#[cfg(feature = "server")]
use crate::registrar::{SeparateTableRegistrar, SphereEventRegistrar};
use crate::registrar::{
    CustomInterfaceRegistrar, EntitySystemRegistrar, EntityTypeCollectionRegistrar,
    EventSystemRegistrar, MessageHandlerResolver, NetworkProtocolRegistrar, OpCodeResolver,
    ResponseTypeResolver,
};

/// Identity of a module, derived from its name.
///
/// Two versions of the same module share a [`ManifestId`]; registering the
/// second replaces the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManifestId(pub u64);

impl ManifestId {
    /// Derive the id of a module name (FNV-1a, like [`TypeIdentity`]).
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        Self(TypeIdentity::from_name(name).0)
    }
}

impl std::fmt::Display for ManifestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Opaque handle to the loaded module (library, plugin state, ...).
pub type ModuleHandle = Arc<dyn Any + Send + Sync>;

/// The registrar capabilities a module exposes. All optional.
#[derive(Clone, Default)]
pub struct Registrars {
    /// Per-entity-type lifecycle handlers.
    pub entity_systems: Option<Arc<dyn EntitySystemRegistrar>>,
    /// Event subscribers.
    pub event_systems: Option<Arc<dyn EventSystemRegistrar>>,
    /// Implementations of host-defined interfaces.
    pub custom_interfaces: Option<Arc<dyn CustomInterfaceRegistrar>>,
    /// Protocol message types.
    pub network_protocol: Option<Arc<dyn NetworkProtocolRegistrar>>,
    /// Which request opcodes the module serves.
    pub message_handlers: Option<Arc<dyn MessageHandlerResolver>>,
    /// Entity types the module defines.
    pub entity_types: Option<Arc<dyn EntityTypeCollectionRegistrar>>,
    /// Opcode to message type mapping.
    pub opcodes: Option<Arc<dyn OpCodeResolver>>,
    /// Request opcode to response type mapping.
    pub response_types: Option<Arc<dyn ResponseTypeResolver>>,
    /// Entity types persisted apart from their owner.
    #[cfg(feature = "server")]
    pub separate_tables: Option<Arc<dyn SeparateTableRegistrar>>,
    /// Event types that may cross process boundaries.
    #[cfg(feature = "server")]
    pub sphere_events: Option<Arc<dyn SphereEventRegistrar>>,
}

impl std::fmt::Debug for Registrars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Registrars");
        s.field("entity_systems", &self.entity_systems.is_some())
            .field("event_systems", &self.event_systems.is_some())
            .field("custom_interfaces", &self.custom_interfaces.is_some())
            .field("network_protocol", &self.network_protocol.is_some())
            .field("message_handlers", &self.message_handlers.is_some())
            .field("entity_types", &self.entity_types.is_some())
            .field("opcodes", &self.opcodes.is_some())
            .field("response_types", &self.response_types.is_some());
        #[cfg(feature = "server")]
        s.field("separate_tables", &self.separate_tables.is_some())
            .field("sphere_events", &self.sphere_events.is_some());
        s.finish()
    }
}

/// A loaded module: its identity, handle and registrars.
pub struct ModuleManifest {
    id: ManifestId,
    name: String,
    module: RwLock<Option<ModuleHandle>>,
    registrars: RwLock<Option<Arc<Registrars>>>,
    interfaces: RwLock<InterfaceTable>,
}

impl ModuleManifest {
    /// Start building a manifest for the named module.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ManifestBuilder {
        ManifestBuilder::new(name)
    }

    /// Create a manifest directly from its parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        module: Option<ModuleHandle>,
        registrars: Registrars,
    ) -> Self {
        let name = name.into();
        Self {
            id: ManifestId::from_name(&name),
            name,
            module: RwLock::new(module),
            registrars: RwLock::new(Some(Arc::new(registrars))),
            interfaces: RwLock::new(InterfaceTable::new()),
        }
    }

    /// The module id.
    #[must_use]
    pub fn id(&self) -> ManifestId {
        self.id
    }

    /// The module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module handle, or `None` once cleared.
    #[must_use]
    pub fn module(&self) -> Option<ModuleHandle> {
        self.module.read().clone()
    }

    /// The registrar set, or `None` once cleared.
    #[must_use]
    pub fn registrars(&self) -> Option<Arc<Registrars>> {
        self.registrars.read().clone()
    }

    /// Returns `true` after [`clear`](Self::clear).
    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.registrars.read().is_none()
    }

    /// Implementations of interface `I` this module registered.
    #[must_use]
    pub fn custom_interfaces<I: CustomInterface + ?Sized>(&self) -> Vec<InterfaceImpl> {
        self.interfaces.read().implementations::<I>().to_vec()
    }

    /// Drop the module handle and registrar set.
    pub fn clear(&self) {
        *self.module.write() = None;
        *self.registrars.write() = None;
    }

    pub(crate) fn register_interfaces(&self) {
        if let Some(registrars) = self.registrars()
            && let Some(registrar) = &registrars.custom_interfaces
        {
            registrar.register(&mut self.interfaces.write());
        }
    }

    pub(crate) fn unregister_interfaces(&self) {
        if let Some(registrars) = self.registrars()
            && let Some(registrar) = &registrars.custom_interfaces
        {
            registrar.unregister(&mut self.interfaces.write());
        }
    }
}

impl std::fmt::Debug for ModuleManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManifest")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("registrars", &self.registrars())
            .finish_non_exhaustive()
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

/// Builder for [`ModuleManifest`].
#[derive(Debug)]
pub struct ManifestBuilder {
    name: String,
    module: Option<ModuleHandle>,
    registrars: Registrars,
}

impl ManifestBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: None,
            registrars: Registrars::default(),
        }
    }

    /// Attach the module handle.
    #[must_use]
    pub fn module(mut self, module: impl Any + Send + Sync) -> Self {
        self.module = Some(Arc::new(module));
        self
    }

    /// Register per-entity-type lifecycle handlers.
    #[must_use]
    pub fn entity_systems(mut self, registrar: impl EntitySystemRegistrar + 'static) -> Self {
        self.registrars.entity_systems = Some(Arc::new(registrar));
        self
    }

    /// Register event subscribers.
    #[must_use]
    pub fn event_systems(mut self, registrar: impl EventSystemRegistrar + 'static) -> Self {
        self.registrars.event_systems = Some(Arc::new(registrar));
        self
    }

    /// Register custom interface implementations.
    #[must_use]
    pub fn custom_interfaces(mut self, registrar: impl CustomInterfaceRegistrar + 'static) -> Self {
        self.registrars.custom_interfaces = Some(Arc::new(registrar));
        self
    }

    /// Declare the module's protocol message types.
    #[must_use]
    pub fn network_protocol(mut self, registrar: impl NetworkProtocolRegistrar + 'static) -> Self {
        self.registrars.network_protocol = Some(Arc::new(registrar));
        self
    }

    /// Declare which request opcodes the module serves.
    #[must_use]
    pub fn message_handlers(mut self, resolver: impl MessageHandlerResolver + 'static) -> Self {
        self.registrars.message_handlers = Some(Arc::new(resolver));
        self
    }

    /// Declare the module's entity types.
    #[must_use]
    pub fn entity_types(mut self, registrar: impl EntityTypeCollectionRegistrar + 'static) -> Self {
        self.registrars.entity_types = Some(Arc::new(registrar));
        self
    }

    /// Map opcodes to message types.
    #[must_use]
    pub fn opcodes(mut self, resolver: impl OpCodeResolver + 'static) -> Self {
        self.registrars.opcodes = Some(Arc::new(resolver));
        self
    }

    /// Map request opcodes to their response types.
    #[must_use]
    pub fn response_types(mut self, resolver: impl ResponseTypeResolver + 'static) -> Self {
        self.registrars.response_types = Some(Arc::new(resolver));
        self
    }

    /// Declare entity types stored in separate tables.
    #[cfg(feature = "server")]
    #[must_use]
    pub fn separate_tables(mut self, registrar: impl SeparateTableRegistrar + 'static) -> Self {
        self.registrars.separate_tables = Some(Arc::new(registrar));
        self
    }

    /// Declare event types allowed across processes.
    #[cfg(feature = "server")]
    #[must_use]
    pub fn sphere_events(mut self, registrar: impl SphereEventRegistrar + 'static) -> Self {
        self.registrars.sphere_events = Some(Arc::new(registrar));
        self
    }

    /// Finish the manifest.
    #[must_use]
    pub fn build(self) -> ModuleManifest {
        ModuleManifest::new(self.name, self.module, self.registrars)
    }
}
