//! Demo gameplay module.
//!
//! Two versions of the same module share one manifest name, so registering
//! one replaces the other in every running scene. Version 1 moves ships one
//! unit per tick, version 2 three units.

use std::sync::atomic::{AtomicBool, Ordering};

use engine_assembly::{
    EntitySystemSet, EntityTypeCollectionRegistrar, EventSystemSet, ModuleManifest,
    SphereEventRegistrar,
};
use engine_component::{DisposableEvent, Entity, Event, TypeIdentity, TypeName};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Manifest name shared by both versions.
pub const MODULE_NAME: &str = "demo.ships";

/// A ship drifting along one axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ship {
    pub position: i64,
    pub velocity: i64,
    pub ticks: u64,
}

impl Default for Ship {
    fn default() -> Self {
        Self {
            position: 0,
            velocity: 1,
            ticks: 0,
        }
    }
}

impl TypeName for Ship {
    fn type_name() -> &'static str {
        "demo::Ship"
    }
}

impl Entity for Ship {}

/// Broadcast to every scene once per host tick.
#[derive(Debug, Clone)]
pub struct Pulse {
    pub tick: u64,
}

impl TypeName for Pulse {
    fn type_name() -> &'static str {
        "demo::Pulse"
    }
}

impl Event for Pulse {}

/// Sphere event forwarded to remote subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flare {
    pub scene: String,
    pub tick: u64,
}

impl TypeName for Flare {
    fn type_name() -> &'static str {
        "demo::Flare"
    }
}

impl Event for Flare {}

/// A pooled buffer of shells, returned to its pool when disposed.
#[derive(Debug, Default)]
pub struct Salvo {
    pub shells: Vec<u32>,
    released: AtomicBool,
}

impl Salvo {
    #[must_use]
    pub fn new(shells: Vec<u32>) -> Self {
        Self {
            shells,
            released: AtomicBool::new(false),
        }
    }
}

impl TypeName for Salvo {
    fn type_name() -> &'static str {
        "demo::Salvo"
    }
}

impl Event for Salvo {}

impl DisposableEvent for Salvo {
    fn dispose(&self) {
        let again = self.released.swap(true, Ordering::SeqCst);
        debug!(shells = self.shells.len(), again, "salvo released");
    }
}

/// Which build of the module to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2,
}

impl Version {
    /// The other version.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::V1 => Self::V2,
            Self::V2 => Self::V1,
        }
    }

    fn step(self) -> i64 {
        match self {
            Self::V1 => 1,
            Self::V2 => 3,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => f.write_str("v1"),
            Self::V2 => f.write_str("v2"),
        }
    }
}

/// Static metadata the module advertises to the registry.
#[derive(Debug, Clone, Copy)]
struct Catalog;

impl EntityTypeCollectionRegistrar for Catalog {
    fn entity_types(&self) -> Vec<TypeIdentity> {
        vec![Ship::type_identity()]
    }
}

impl SphereEventRegistrar for Catalog {
    fn sphere_events(&self) -> Vec<TypeIdentity> {
        vec![Flare::type_identity()]
    }
}

/// Build the manifest of one version of the demo module.
#[must_use]
pub fn manifest(version: Version) -> ModuleManifest {
    let step = version.step();
    ModuleManifest::builder(MODULE_NAME)
        .module(version)
        .entity_types(Catalog)
        .sphere_events(Catalog)
        .entity_systems(move |systems: &mut EntitySystemSet| {
            systems
                .awake::<Ship, _>(|_, ctx| {
                    let me = ctx.entity();
                    ctx.register_update(me);
                    Ok(())
                })
                .update::<Ship, _>(move |ship, _| {
                    ship.position += ship.velocity * step;
                    ship.ticks += 1;
                    Ok(())
                })
                .destroy::<Ship, _>(|ship, ctx| {
                    debug!(entity = %ctx.entity(), position = ship.position, "ship destroyed");
                    Ok(())
                });
        })
        .event_systems(move |events: &mut EventSystemSet| {
            events
                .subscribe::<Pulse, _>(move |pulse| {
                    debug!(tick = pulse.tick, version = %version, "pulse");
                    Ok(())
                })
                .subscribe::<Salvo, _>(|salvo| {
                    debug!(shells = salvo.shells.len(), "salvo fired");
                    Ok(())
                })
                .subscribe_async::<Pulse, _, _>(|pulse| async move {
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                    debug!(tick = pulse.tick, "pulse echoed");
                    Ok::<_, anyhow::Error>(())
                });
        })
        .build()
}
