//! Host tick loop.
//!
//! Drives every scene at a fixed rate:
//!
//! 1. Tick each scene (update, then late update).
//! 2. Publish the per-tick events.
//! 3. Every `reload_every` ticks, hot-swap the demo module and put surviving
//!    entities back on their queues.

use std::time::{Duration, Instant};

use engine_assembly::ManifestRegistry;
use engine_component::Disposal;
use engine_system::{Scene, SceneHandle};
use tracing::{debug, info, warn};

use crate::demo::{self, Flare, Pulse, Salvo, Version};

/// How often the secondary events (async, sphere, disposable) go out.
const BROADCAST_EVERY: u64 = 10;

/// Configuration for the host tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
    /// Swap module versions every this many ticks (0 = never).
    pub reload_every: u64,
}

/// The host's tick loop state.
#[derive(Debug)]
pub struct TickLoop {
    tick_id: u64,
    config: TickConfig,
    registry: ManifestRegistry,
    scenes: Vec<SceneHandle>,
    version: Version,
}

impl TickLoop {
    /// Create a tick loop over already-started scenes.
    ///
    /// `version` is the demo module version currently registered.
    #[must_use]
    pub fn new(
        config: TickConfig,
        registry: ManifestRegistry,
        scenes: Vec<SceneHandle>,
        version: Version,
    ) -> Self {
        Self {
            tick_id: 0,
            config,
            registry,
            scenes,
            version,
        }
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns the module version currently loaded.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Run one host tick across every scene.
    ///
    /// # Errors
    ///
    /// Returns an error if a scene has shut down underneath the loop.
    pub async fn tick(&mut self) -> anyhow::Result<()> {
        self.tick_id += 1;
        let tick = self.tick_id;

        for scene in &self.scenes {
            let dispatched = scene.tick().await?;
            let failed = scene.publish(Pulse { tick }).await?;
            debug!(scene = %scene.name(), tick, dispatched, failed, "scene ticked");

            if tick % BROADCAST_EVERY == 0 {
                scene.publish_async(Pulse { tick }).await?;
                scene
                    .publish_disposable(Salvo::new(vec![1, 2, 3]), Disposal::Auto)
                    .await?;
                let flare = Flare {
                    scene: scene.name().to_owned(),
                    tick,
                };
                if let Err(e) = scene.publish_sphere(flare).await {
                    warn!(scene = %scene.name(), error = %e, "flare not delivered");
                }
            }
        }

        if self.config.reload_every > 0 && tick % self.config.reload_every == 0 {
            self.hot_reload().await?;
        }
        Ok(())
    }

    /// Replace the demo module with its other version.
    ///
    /// # Errors
    ///
    /// Returns an error if a scene has shut down.
    pub async fn hot_reload(&mut self) -> anyhow::Result<()> {
        let next = self.version.next();
        let started = Instant::now();
        self.registry.register(demo::manifest(next)).await;
        let mut resumed = 0;
        for scene in &self.scenes {
            resumed += scene.post(Scene::resume_updates).await?;
        }
        self.version = next;
        info!(
            tick_id = self.tick_id,
            version = %next,
            resumed,
            elapsed_us = started.elapsed().as_micros() as u64,
            "module hot-reloaded"
        );
        Ok(())
    }

    /// Run for the configured number of ticks, or until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if a scene has shut down underneath the loop.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate.max(f64::EPSILON));
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            reload_every = self.config.reload_every,
            scenes = self.scenes.len(),
            "starting tick loop"
        );

        loop {
            let start = Instant::now();
            self.tick().await?;

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                tokio::time::sleep(tick_duration - elapsed).await;
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
        Ok(())
    }

    /// Detach and close every scene.
    pub async fn shutdown(self) {
        for scene in &self.scenes {
            if let Err(e) = scene.shutdown(&self.registry).await {
                warn!(scene = %scene.name(), error = %e, "scene already closed");
            }
        }
        info!(scenes = self.scenes.len(), "scenes shut down");
    }
}
