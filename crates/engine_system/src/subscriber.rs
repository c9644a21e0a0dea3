//! Lifecycle subscribers that forward manifest loads into a running scene.
//!
//! The registry notifies from whatever task called `register`; these
//! adapters post the load or unload onto the scene task and wait for it, so
//! a reload has been applied to the scene by the time the registry moves on.

use std::sync::Arc;

use async_trait::async_trait;
use engine_assembly::{AssemblyError, AssemblyLifecycle, ModuleManifest, SubscriberId};

use crate::error::SceneError;
use crate::runner::SceneHandle;

fn ensure_live(manifest: &ModuleManifest) -> Result<(), AssemblyError> {
    if manifest.is_cleared() {
        return Err(AssemblyError::ManifestCleared(manifest.id()));
    }
    Ok(())
}

fn unavailable(subscriber: SubscriberId, error: &SceneError) -> AssemblyError {
    AssemblyError::SubscriberUnavailable {
        subscriber,
        reason: error.to_string(),
    }
}

/// Applies entity systems of loaded manifests to one scene.
#[derive(Debug)]
pub struct EntitySystemSubscriber {
    id: SubscriberId,
    scene: SceneHandle,
}

impl EntitySystemSubscriber {
    /// Create a subscriber feeding `scene`.
    #[must_use]
    pub fn new(id: SubscriberId, scene: SceneHandle) -> Self {
        Self { id, scene }
    }
}

#[async_trait]
impl AssemblyLifecycle for EntitySystemSubscriber {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    async fn on_load(&self, manifest: Arc<ModuleManifest>) -> Result<(), AssemblyError> {
        ensure_live(&manifest)?;
        self.scene
            .post(move |scene| {
                scene.load_entity_systems(&manifest);
            })
            .await
            .map_err(|e| unavailable(self.id, &e))
    }

    async fn on_unload(&self, manifest: Arc<ModuleManifest>) -> Result<(), AssemblyError> {
        let id = manifest.id();
        self.scene
            .post(move |scene| {
                scene.unload_entity_systems(id);
            })
            .await
            .map_err(|e| unavailable(self.id, &e))
    }
}

/// Applies event systems of loaded manifests to one scene.
#[derive(Debug)]
pub struct EventSystemSubscriber {
    id: SubscriberId,
    scene: SceneHandle,
}

impl EventSystemSubscriber {
    /// Create a subscriber feeding `scene`.
    #[must_use]
    pub fn new(id: SubscriberId, scene: SceneHandle) -> Self {
        Self { id, scene }
    }
}

#[async_trait]
impl AssemblyLifecycle for EventSystemSubscriber {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    async fn on_load(&self, manifest: Arc<ModuleManifest>) -> Result<(), AssemblyError> {
        ensure_live(&manifest)?;
        self.scene
            .post(move |scene| {
                scene.load_event_systems(&manifest);
            })
            .await
            .map_err(|e| unavailable(self.id, &e))
    }

    async fn on_unload(&self, manifest: Arc<ModuleManifest>) -> Result<(), AssemblyError> {
        let id = manifest.id();
        self.scene
            .post(move |scene| {
                scene.unload_event_systems(id);
            })
            .await
            .map_err(|e| unavailable(self.id, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use engine_assembly::ManifestRegistry;

    use crate::{SceneConfig, SceneRunner};

    #[tokio::test]
    async fn test_closed_scene_reports_unavailable() {
        let registry = ManifestRegistry::new();
        let handle = SceneRunner::new(SceneConfig::new("gone"))
            .start(&ManifestRegistry::new())
            .await;
        handle.post(crate::Scene::close).await.unwrap();

        let subscriber = EntitySystemSubscriber::new(SubscriberId::new(), handle);
        let manifest = registry.register(ModuleManifest::builder("m").build()).await;
        let err = subscriber.on_load(manifest).await.unwrap_err();
        assert!(matches!(err, AssemblyError::SubscriberUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_cleared_manifest_is_refused() {
        let registry = ManifestRegistry::new();
        let handle = SceneRunner::new(SceneConfig::new("lobby"))
            .start(&ManifestRegistry::new())
            .await;
        let manifest = registry.register(ModuleManifest::builder("m").build()).await;
        assert!(registry.unregister(manifest.id()).await);

        let entities = EntitySystemSubscriber::new(SubscriberId::new(), handle.clone());
        let events = EventSystemSubscriber::new(SubscriberId::new(), handle);
        for err in [
            entities.on_load(Arc::clone(&manifest)).await.unwrap_err(),
            events.on_load(manifest).await.unwrap_err(),
        ] {
            assert!(matches!(err, AssemblyError::ManifestCleared(_)));
        }
    }
}
