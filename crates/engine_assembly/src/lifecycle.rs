//! Load/unload notification fan-out.
//!
//! Subscribers are typically per-scene dispatch engines living on their own
//! execution context; their `on_load`/`on_unload` implementations post the
//! work there and await it. The broadcaster notifies subscribers one at a
//! time, in attach order, so a reload has reached every scene before the
//! registry moves on.
//!
//! Attaching does not replay manifests that are already loaded. A subscriber
//! that attaches late catches up by walking
//! [`ManifestRegistry::manifests`](crate::ManifestRegistry::manifests) itself.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::AssemblyError;
use crate::manifest::ModuleManifest;

/// Identity of a lifecycle subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// A fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Receives manifest load and unload notifications.
#[async_trait]
pub trait AssemblyLifecycle: Send + Sync {
    /// Stable identity used for attach/detach.
    fn subscriber_id(&self) -> SubscriberId;

    /// A manifest was registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscriber could not apply the manifest. The
    /// broadcaster logs it and carries on with the next subscriber.
    async fn on_load(&self, manifest: Arc<ModuleManifest>) -> Result<(), AssemblyError>;

    /// A manifest is being unregistered or replaced.
    ///
    /// # Errors
    ///
    /// Same contract as [`on_load`](Self::on_load).
    async fn on_unload(&self, manifest: Arc<ModuleManifest>) -> Result<(), AssemblyError>;
}

/// Registry of lifecycle subscribers.
#[derive(Default)]
pub struct LifecycleBroadcaster {
    subscribers: Mutex<Vec<Arc<dyn AssemblyLifecycle>>>,
}

impl LifecycleBroadcaster {
    /// Create an empty broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber. Returns `false` if one with the same id is
    /// already attached.
    pub fn add(&self, subscriber: Arc<dyn AssemblyLifecycle>) -> bool {
        let mut subscribers = self.subscribers.lock();
        let id = subscriber.subscriber_id();
        if subscribers.iter().any(|s| s.subscriber_id() == id) {
            return false;
        }
        subscribers.push(subscriber);
        debug!(subscriber = %id, "lifecycle subscriber attached");
        true
    }

    /// Detach a subscriber. Returns `false` if it was not attached.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.subscriber_id() != id);
        let removed = subscribers.len() != before;
        if removed {
            debug!(subscriber = %id, "lifecycle subscriber detached");
        }
        removed
    }

    /// Returns `true` if a subscriber with this id is attached.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().iter().any(|s| s.subscriber_id() == id)
    }

    /// Returns the number of attached subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Returns `true` if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    /// Detach every subscriber.
    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }

    /// Notify every subscriber that `manifest` was loaded.
    ///
    /// Returns the number of subscribers that failed.
    pub async fn on_load(&self, manifest: &Arc<ModuleManifest>) -> usize {
        let mut failed = 0;
        for subscriber in self.snapshot() {
            if let Err(e) = subscriber.on_load(Arc::clone(manifest)).await {
                error!(
                    manifest = manifest.name(),
                    subscriber = %subscriber.subscriber_id(),
                    error = %e,
                    "on_load failed"
                );
                failed += 1;
            }
        }
        failed
    }

    /// Notify every subscriber that `manifest` is going away.
    ///
    /// Returns the number of subscribers that failed.
    pub async fn on_unload(&self, manifest: &Arc<ModuleManifest>) -> usize {
        let mut failed = 0;
        for subscriber in self.snapshot() {
            if let Err(e) = subscriber.on_unload(Arc::clone(manifest)).await {
                error!(
                    manifest = manifest.name(),
                    subscriber = %subscriber.subscriber_id(),
                    error = %e,
                    "on_unload failed"
                );
                failed += 1;
            }
        }
        failed
    }

    // The lock is never held across an await.
    fn snapshot(&self) -> Vec<Arc<dyn AssemblyLifecycle>> {
        self.subscribers.lock().clone()
    }
}

impl std::fmt::Debug for LifecycleBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleBroadcaster")
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;

    /// Records every notification it receives.
    pub(crate) struct Recorder {
        id: SubscriberId,
        pub(crate) log: Arc<SyncMutex<Vec<String>>>,
        fail: bool,
    }

    impl Recorder {
        pub(crate) fn new(log: Arc<SyncMutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                id: SubscriberId::new(),
                log,
                fail: false,
            })
        }

        pub(crate) fn failing(log: Arc<SyncMutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                id: SubscriberId::new(),
                log,
                fail: true,
            })
        }
    }

    #[async_trait]
    impl AssemblyLifecycle for Recorder {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        async fn on_load(&self, manifest: Arc<ModuleManifest>) -> Result<(), AssemblyError> {
            self.log.lock().push(format!("load:{}", manifest.name()));
            if self.fail {
                return Err(AssemblyError::SubscriberUnavailable {
                    subscriber: self.id,
                    reason: "closed".into(),
                });
            }
            Ok(())
        }

        async fn on_unload(&self, manifest: Arc<ModuleManifest>) -> Result<(), AssemblyError> {
            self.log.lock().push(format!("unload:{}", manifest.name()));
            if self.fail {
                return Err(AssemblyError::SubscriberUnavailable {
                    subscriber: self.id,
                    reason: "closed".into(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_add_is_idempotent() {
        let broadcaster = LifecycleBroadcaster::new();
        let recorder = Recorder::new(Arc::default());
        assert!(broadcaster.add(recorder.clone()));
        assert!(!broadcaster.add(recorder.clone()));
        assert_eq!(broadcaster.len(), 1);

        assert!(broadcaster.remove(recorder.subscriber_id()));
        assert!(!broadcaster.remove(recorder.subscriber_id()));
        assert!(broadcaster.is_empty());
    }

    #[tokio::test]
    async fn test_notifies_in_attach_order() {
        let log: Arc<SyncMutex<Vec<String>>> = Arc::default();
        let broadcaster = LifecycleBroadcaster::new();
        let first = Recorder::new(Arc::clone(&log));
        let second = Recorder::new(Arc::clone(&log));
        broadcaster.add(first);
        broadcaster.add(second);

        let manifest = Arc::new(ModuleManifest::builder("m").build());
        assert_eq!(broadcaster.on_load(&manifest).await, 0);
        assert_eq!(broadcaster.on_unload(&manifest).await, 0);
        assert_eq!(*log.lock(), vec!["load:m", "load:m", "unload:m", "unload:m"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_fan_out() {
        let log: Arc<SyncMutex<Vec<String>>> = Arc::default();
        let broadcaster = LifecycleBroadcaster::new();
        broadcaster.add(Recorder::failing(Arc::clone(&log)));
        broadcaster.add(Recorder::new(Arc::clone(&log)));

        let manifest = Arc::new(ModuleManifest::builder("m").build());
        assert_eq!(broadcaster.on_load(&manifest).await, 1);
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_new_events() {
        let log: Arc<SyncMutex<Vec<String>>> = Arc::default();
        let broadcaster = LifecycleBroadcaster::new();
        let early = Arc::new(ModuleManifest::builder("early").build());
        broadcaster.on_load(&early).await;

        broadcaster.add(Recorder::new(Arc::clone(&log)));
        let late = Arc::new(ModuleManifest::builder("late").build());
        broadcaster.on_load(&late).await;
        assert_eq!(*log.lock(), vec!["load:late"]);
    }
}
