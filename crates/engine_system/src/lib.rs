//! # engine_system
//!
//! Per-scene runtime for hot-reloadable modules.
//!
//! Each scene owns an [`EntityDispatchEngine`] and an [`EventDispatchEngine`].
//! Both are fed by [`ModuleManifest`](engine_assembly::ModuleManifest) loads
//! and unloads coming from a shared
//! [`ManifestRegistry`](engine_assembly::ManifestRegistry), and both dispatch
//! only on the scene's own task:
//!
//! 1. [`SceneRunner::start`] spawns the scene task and attaches the two
//!    engines to the registry as lifecycle subscribers.
//! 2. Manifests already loaded are applied, later ones arrive as they are
//!    registered, replaced or removed.
//! 3. Callers drive the scene through a [`SceneHandle`]: ticks, events,
//!    sphere-event subscriptions and arbitrary posted work.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use engine_assembly::{EntitySystemSet, ManifestRegistry, ModuleManifest};
//! use engine_component::{Entity, TypeName};
//! use engine_system::{SceneConfig, SceneRunner};
//!
//! #[derive(Default)]
//! struct Ship {
//!     ticks: u64,
//! }
//!
//! impl TypeName for Ship {
//!     fn type_name() -> &'static str { "game::Ship" }
//! }
//!
//! impl Entity for Ship {}
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = ManifestRegistry::new();
//!     let scene = SceneRunner::new(SceneConfig::new("lobby")).start(&registry).await;
//!
//!     registry
//!         .register(
//!             ModuleManifest::builder("ships")
//!                 .entity_systems(|systems: &mut EntitySystemSet| {
//!                     systems.update::<Ship, _>(|ship, _| {
//!                         ship.ticks += 1;
//!                         Ok(())
//!                     });
//!                 })
//!                 .build(),
//!         )
//!         .await;
//!
//!     let ship = scene.spawn(Ship::default()).await?;
//!     scene.post(move |s| s.register_update(ship)).await??;
//!     scene.tick().await?;
//!     scene.shutdown(&registry).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod entity_system;
pub mod error;
pub mod event_system;
pub mod handler;
pub mod runner;
pub mod scene;
pub mod sphere;
pub mod subscriber;
pub mod update_queue;

pub use config::SceneConfig;
pub use entity_system::EntityDispatchEngine;
pub use error::{HandlerFault, SceneError};
pub use event_system::EventDispatchEngine;
pub use handler::{
    handle_subscribe, handle_unsubscribe, scene_error_code, validate_subscribe,
    validate_unsubscribe,
};
pub use runner::{SceneHandle, SceneRunner};
pub use scene::Scene;
pub use sphere::SphereEventTable;
pub use subscriber::{EntitySystemSubscriber, EventSystemSubscriber};
pub use update_queue::UpdateQueue;
