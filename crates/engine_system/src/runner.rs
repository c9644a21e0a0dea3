//! Scene runner: one task per scene, fed through a bounded mailbox.
//!
//! The runner owns the [`Scene`] and applies posted work to it strictly one
//! job at a time. Everything that wants to touch the scene, from a manifest
//! reload to a network request, goes through a [`SceneHandle`] and waits for
//! the job's reply. An optional fixed-rate ticker interleaves with the
//! mailbox on the same task.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use engine_assembly::{ManifestRegistry, ModuleManifest, SubscriberId};
use engine_component::{DisposableEvent, Disposal, Entity, Event, RuntimeId};
use engine_net::RemoteEventSink;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SceneConfig;
use crate::error::{SceneError, panic_message};
use crate::scene::Scene;
use crate::subscriber::{EntitySystemSubscriber, EventSystemSubscriber};

type Job = Box<dyn FnOnce(&mut Scene) + Send>;

/// Builds a scene and starts its task.
pub struct SceneRunner {
    config: SceneConfig,
    remote: Option<Arc<dyn RemoteEventSink>>,
}

impl SceneRunner {
    /// Create a runner for the given config.
    #[must_use]
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            remote: None,
        }
    }

    /// Deliver the scene's sphere events through `sink`.
    #[must_use]
    pub fn with_remote_sink(mut self, sink: Arc<dyn RemoteEventSink>) -> Self {
        self.remote = Some(sink);
        self
    }

    /// Returns the scene name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Spawn the scene task and wire it to the registry.
    ///
    /// Both dispatch engines are attached as lifecycle subscribers first,
    /// then every manifest already registered is applied. A manifest that
    /// lands between the two steps is applied twice, which loading tolerates.
    /// One that is unregistered or replaced in between is skipped.
    pub async fn start(self, registry: &ManifestRegistry) -> SceneHandle {
        let (mailbox, jobs) = mpsc::channel(self.config.mailbox_capacity.max(1));
        let mut scene = Scene::new(&self.config);
        if let Some(remote) = self.remote {
            scene = scene.with_remote_sink(remote);
        }

        let handle = SceneHandle {
            name: Arc::from(self.config.name.as_str()),
            mailbox,
            subscribers: [SubscriberId::new(), SubscriberId::new()],
        };
        tokio::spawn(run(scene, jobs, self.config.tick_rate));

        let [entity_subscriber, event_subscriber] = handle.subscribers;
        registry.lifecycle().add(Arc::new(EntitySystemSubscriber::new(
            entity_subscriber,
            handle.clone(),
        )));
        registry.lifecycle().add(Arc::new(EventSystemSubscriber::new(
            event_subscriber,
            handle.clone(),
        )));

        let loaded: Vec<_> = registry.manifests().collect();
        let catch_up = catch_up(&handle, registry, loaded).await;

        info!(
            scene = %handle.name,
            scene_id = self.config.scene_id,
            manifests = catch_up,
            tick_rate = ?self.config.tick_rate,
            "scene started"
        );
        handle
    }
}

/// Apply a snapshot of registered manifests to a freshly started scene.
///
/// Each manifest is re-checked against the registry on the scene task. The
/// registry drops a manifest from its map before notifying subscribers, so a
/// manifest still present there has its unload queued behind this job.
async fn catch_up(
    handle: &SceneHandle,
    registry: &ManifestRegistry,
    loaded: Vec<Arc<ModuleManifest>>,
) -> usize {
    let mut applied = 0;
    for manifest in loaded {
        let name = manifest.name().to_owned();
        let registry = registry.clone();
        let outcome = handle
            .post(move |scene| {
                let current = registry
                    .get(manifest.id())
                    .is_some_and(|m| Arc::ptr_eq(&m, &manifest));
                if current {
                    scene.load_entity_systems(&manifest);
                    scene.load_event_systems(&manifest);
                }
                current
            })
            .await;
        match outcome {
            Ok(true) => applied += 1,
            Ok(false) => {
                debug!(scene = %handle.name, manifest = %name, "stale manifest skipped");
            }
            Err(e) => {
                warn!(scene = %handle.name, manifest = %name, error = %e, "catch-up load failed");
            }
        }
    }
    applied
}

impl std::fmt::Debug for SceneRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneRunner")
            .field("config", &self.config)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

/// Cloneable address of a running scene.
#[derive(Clone)]
pub struct SceneHandle {
    name: Arc<str>,
    mailbox: mpsc::Sender<Job>,
    subscribers: [SubscriberId; 2],
}

impl SceneHandle {
    /// Returns the scene name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` once the scene task has stopped accepting work.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Run `job` on the scene task and wait for its result.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Closed`] if the scene has shut down, or
    /// [`SceneError::JobPanicked`] if the job panicked. The scene keeps
    /// running after a panicking job.
    pub async fn post<R, F>(&self, job: F) -> Result<R, SceneError>
    where
        F: FnOnce(&mut Scene) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let job: Job = Box::new(move |scene| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(scene)))
                .map_err(|payload| {
                    let message = panic_message(payload.as_ref());
                    error!(scene = %scene.name(), panic = %message, "scene job panicked");
                    message
                });
            let _ = reply.send(outcome);
        });
        self.mailbox
            .send(job)
            .await
            .map_err(|_| SceneError::Closed(self.name.to_string()))?;
        match result.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(SceneError::JobPanicked {
                scene: self.name.to_string(),
                message,
            }),
            Err(_) => Err(SceneError::Closed(self.name.to_string())),
        }
    }

    /// Spawn an entity.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Closed`] if the scene has shut down.
    pub async fn spawn<T: Entity>(&self, value: T) -> Result<RuntimeId, SceneError> {
        self.post(move |scene| scene.spawn(value)).await
    }

    /// Run one tick. Returns the number of entities dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Closed`] if the scene has shut down.
    pub async fn tick(&self) -> Result<usize, SceneError> {
        self.post(Scene::tick).await
    }

    /// Publish an event to its synchronous subscribers. Returns failures.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Closed`] if the scene has shut down.
    pub async fn publish<E: Event>(&self, event: E) -> Result<usize, SceneError> {
        self.post(move |scene| scene.publish(&event)).await
    }

    /// Publish a disposable event to its synchronous subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Closed`] if the scene has shut down.
    pub async fn publish_disposable<E: DisposableEvent>(
        &self,
        event: E,
        disposal: Disposal,
    ) -> Result<usize, SceneError> {
        self.post(move |scene| scene.publish_disposable(&event, disposal))
            .await
    }

    /// Publish an event to its async subscribers and wait for all of them.
    ///
    /// The handlers are started on the scene task, but awaited here, so the
    /// scene keeps processing other work in the meantime.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Closed`] if the scene has shut down.
    pub async fn publish_async<E: Event>(&self, event: E) -> Result<usize, SceneError> {
        let pending = self.post(move |scene| scene.publish_async(event)).await?;
        Ok(pending.await)
    }

    /// Publish a sphere event to every subscribed remote route.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Closed`] if the scene has shut down, or the
    /// scene's own encoding or delivery error.
    pub async fn publish_sphere<E>(&self, event: E) -> Result<usize, SceneError>
    where
        E: Event + Serialize,
    {
        self.post(move |scene| scene.publish_sphere(&event))
            .await?
    }

    /// Detach from the registry, then close the scene.
    ///
    /// After this returns no further reload reaches the scene and every
    /// [`post`](Self::post) fails with [`SceneError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Closed`] if the scene was already gone.
    pub async fn shutdown(&self, registry: &ManifestRegistry) -> Result<(), SceneError> {
        for id in self.subscribers {
            registry.lifecycle().remove(id);
        }
        self.post(Scene::close).await
    }
}

impl std::fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneHandle")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn run(mut scene: Scene, mut jobs: mpsc::Receiver<Job>, tick_rate: Option<Duration>) {
    let mut ticker = tick_rate.map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });

    loop {
        tokio::select! {
            job = jobs.recv() => {
                let Some(job) = job else {
                    debug!(scene = %scene.name(), "all handles dropped");
                    break;
                };
                job(&mut scene);
            }
            () = next_tick(&mut ticker) => {
                scene.tick();
            }
        }
        if scene.is_closed() {
            break;
        }
    }

    jobs.close();
    scene.close();
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
