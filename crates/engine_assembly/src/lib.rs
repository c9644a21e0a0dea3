//! # engine_assembly
//!
//! The runtime-facing side of dynamically (re)loadable code modules.
//!
//! An external loader turns a compiled module into a [`ModuleManifest`]: an
//! identity plus a set of registrar capabilities. The [`ManifestRegistry`]
//! stores manifests and, through the [`LifecycleBroadcaster`], tells every
//! attached subscriber (the per-scene dispatch engines) to merge or roll
//! back that module's contributions.
//!
//! ## Reload ordering
//!
//! Registering an id that is already present first unregisters the previous
//! manifest completely (every subscriber has rolled it back) before the new
//! one is stored and announced. Registrations of distinct ids never wait on
//! each other.
//!
//! ```rust,no_run
//! use engine_assembly::{EntitySystemSet, ManifestRegistry, ModuleManifest};
//!
//! # async fn load() {
//! let registry = ManifestRegistry::new();
//! let manifest = ModuleManifest::builder("game.logic")
//!     .entity_systems(|_systems: &mut EntitySystemSet| {
//!         // systems.update::<Ship, _>(|ship, ctx| { ... });
//!     })
//!     .build();
//! registry.register(manifest).await;
//! # }
//! ```

pub mod error;
pub mod interface;
pub mod lifecycle;
pub mod manifest;
pub mod registrar;
pub mod registry;
pub mod systems;

pub use error::AssemblyError;
pub use interface::{CustomInterface, InterfaceImpl, InterfaceTable};
pub use lifecycle::{AssemblyLifecycle, LifecycleBroadcaster, SubscriberId};
pub use manifest::{ManifestBuilder, ManifestId, ModuleHandle, ModuleManifest, Registrars};
pub use registrar::{
    CustomInterfaceRegistrar, EntitySystemRegistrar, EntityTypeCollectionRegistrar,
    EventSystemRegistrar, MessageHandlerResolver, NetworkProtocolRegistrar, OpCodeResolver,
    ResponseTypeResolver,
};
#[cfg(feature = "server")]
pub use registrar::{SeparateTableRegistrar, SphereEventRegistrar};
pub use registry::ManifestRegistry;
pub use systems::{
    AsyncEventHandler, EntityHandler, EntitySystem, EntitySystemSet, EventHandler, EventPayload,
    EventSubscriber, EventSystemSet, SystemKind,
};
