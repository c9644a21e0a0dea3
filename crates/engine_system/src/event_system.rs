//! Per-scene event dispatch.
//!
//! Two independent subscriber maps, synchronous and asynchronous, keyed by
//! payload [`TypeIdentity`]. Subscribers run in registration order; reloading
//! one module moves only that module's subscribers to the back.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use engine_assembly::{
    AsyncEventHandler, EventHandler, EventPayload, EventSystemSet, ManifestId, ModuleManifest,
};
use engine_component::{DisposableEvent, Disposal, Event, TypeIdentity};
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tracing::{debug, error, info};

use crate::error::{HandlerFault, isolate, panic_message};

struct Subscriber<H> {
    owner: ManifestId,
    handler: H,
}

type SubscriberMap<H> = HashMap<TypeIdentity, Vec<Subscriber<H>>>;

fn remove_owner<H>(map: &mut SubscriberMap<H>, owner: ManifestId) -> usize {
    let mut removed = 0;
    map.retain(|_, list| {
        let before = list.len();
        list.retain(|s| s.owner != owner);
        removed += before - list.len();
        !list.is_empty()
    });
    removed
}

/// Event subscriber tables of one scene.
#[derive(Default)]
pub struct EventDispatchEngine {
    applied: Vec<ManifestId>,
    sync: SubscriberMap<EventHandler>,
    asynchronous: SubscriberMap<AsyncEventHandler>,
}

impl EventDispatchEngine {
    /// Create an engine with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a manifest's event subscribers, rolling back a previous load of
    /// the same id first. Returns the number of subscribers merged.
    pub fn load(&mut self, manifest: &ModuleManifest) -> usize {
        let id = manifest.id();
        if self.is_applied(id) {
            self.unload(id);
        }

        let Some(registrar) = manifest.registrars().and_then(|r| r.event_systems.clone()) else {
            debug!(manifest = manifest.name(), "manifest has no event systems");
            return 0;
        };
        let mut events = EventSystemSet::new();
        if let Err(fault) = isolate(|| {
            registrar.register_events(&mut events);
            Ok(())
        }) {
            error!(manifest = manifest.name(), error = %fault, "event system registrar failed");
            return 0;
        }

        for s in events.sync_subscribers() {
            self.sync.entry(s.type_identity).or_default().push(Subscriber {
                owner: id,
                handler: Arc::clone(&s.handler),
            });
        }
        for s in events.async_subscribers() {
            self.asynchronous
                .entry(s.type_identity)
                .or_default()
                .push(Subscriber {
                    owner: id,
                    handler: Arc::clone(&s.handler),
                });
        }
        self.applied.push(id);
        info!(manifest = manifest.name(), subscribers = events.len(), "event systems loaded");
        events.len()
    }

    /// Remove every subscriber a manifest contributed. Returns `false` if the
    /// manifest was not applied.
    pub fn unload(&mut self, id: ManifestId) -> bool {
        let Some(position) = self.applied.iter().position(|applied| *applied == id) else {
            return false;
        };
        self.applied.remove(position);
        let removed = remove_owner(&mut self.sync, id) + remove_owner(&mut self.asynchronous, id);
        info!(manifest_id = %id, subscribers = removed, "event systems unloaded");
        true
    }

    /// Returns `true` if the manifest's subscribers are merged.
    #[must_use]
    pub fn is_applied(&self, id: ManifestId) -> bool {
        self.applied.contains(&id)
    }

    /// Number of synchronous subscribers for a payload type.
    #[must_use]
    pub fn sync_count(&self, type_identity: TypeIdentity) -> usize {
        self.sync.get(&type_identity).map_or(0, Vec::len)
    }

    /// Number of asynchronous subscribers for a payload type.
    #[must_use]
    pub fn async_count(&self, type_identity: TypeIdentity) -> usize {
        self.asynchronous.get(&type_identity).map_or(0, Vec::len)
    }

    // ── Publishing ──────────────────────────────────────────────────────────

    /// Run every synchronous subscriber of `E` in registration order.
    ///
    /// Failures are logged and do not stop the remaining subscribers.
    /// Returns the number of subscribers that failed.
    pub fn publish<E: Event>(&self, event: &E) -> usize {
        let Some(subscribers) = self.sync.get(&E::type_identity()) else {
            return 0;
        };
        let mut failed = 0;
        for subscriber in subscribers {
            if let Err(fault) = isolate(|| (subscriber.handler)(event as &EventPayload)) {
                log_fault(E::type_name(), subscriber.owner, &fault);
                failed += 1;
            }
        }
        failed
    }

    /// Publish a resource-owning payload, then dispose it once.
    ///
    /// With [`Disposal::Auto`] the payload is disposed exactly once after
    /// every subscriber has been attempted, whether there were zero
    /// subscribers or some of them failed.
    pub fn publish_disposable<E: DisposableEvent>(&self, event: &E, disposal: Disposal) -> usize {
        let failed = self.publish(event);
        if disposal.is_auto() {
            dispose(event);
        }
        failed
    }

    /// Run every asynchronous subscriber of `E` concurrently.
    ///
    /// The returned future completes once every subscriber has completed,
    /// successfully or not, and yields the number that failed. It does not
    /// borrow the engine, so the scene can keep working while it runs.
    pub fn publish_async<E: Event>(&self, event: E) -> BoxFuture<'static, usize> {
        let payload: Arc<EventPayload> = Arc::new(event);
        self.join_async::<E>(payload)
    }

    /// Asynchronous counterpart of [`publish_disposable`](Self::publish_disposable).
    ///
    /// Disposal happens after every subscriber's completion has been
    /// observed. Keep another `Arc` to the payload to use it afterwards.
    pub fn publish_disposable_async<E: DisposableEvent>(
        &self,
        event: Arc<E>,
        disposal: Disposal,
    ) -> BoxFuture<'static, usize> {
        let payload: Arc<EventPayload> = event.clone();
        let all = self.join_async::<E>(payload);
        async move {
            let failed = all.await;
            if disposal.is_auto() {
                dispose(event.as_ref());
            }
            failed
        }
        .boxed()
    }

    fn join_async<E: Event>(&self, payload: Arc<EventPayload>) -> BoxFuture<'static, usize> {
        let type_name = E::type_name();
        let calls: Vec<_> = self
            .asynchronous
            .get(&E::type_identity())
            .map(|subscribers| {
                subscribers
                    .iter()
                    .map(|subscriber| {
                        let owner = subscriber.owner;
                        let started = isolate(|| Ok((subscriber.handler)(Arc::clone(&payload))));
                        async move {
                            let outcome = match started {
                                Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                                    Ok(result) => result.map_err(HandlerFault::Failed),
                                    Err(panic) => {
                                        Err(HandlerFault::Panicked(panic_message(panic.as_ref())))
                                    }
                                },
                                Err(fault) => Err(fault),
                            };
                            if let Err(fault) = &outcome {
                                log_fault(type_name, owner, fault);
                            }
                            outcome.is_err()
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        async move {
            future::join_all(calls)
                .await
                .into_iter()
                .filter(|failed| *failed)
                .count()
        }
        .boxed()
    }

    /// Drop every subscriber.
    pub fn clear(&mut self) {
        self.applied.clear();
        self.sync.clear();
        self.asynchronous.clear();
    }
}

impl std::fmt::Debug for EventDispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatchEngine")
            .field("applied", &self.applied)
            .field("sync_types", &self.sync.len())
            .field("async_types", &self.asynchronous.len())
            .finish()
    }
}

fn log_fault(type_name: &'static str, owner: ManifestId, fault: &HandlerFault) {
    error!(
        event = type_name,
        kind = "event",
        manifest_id = %owner,
        error = %fault,
        "event subscriber failed"
    );
}

fn dispose<E: DisposableEvent>(event: &E) {
    if let Err(fault) = isolate(|| {
        event.dispose();
        Ok(())
    }) {
        error!(event = E::type_name(), error = %fault, "event disposal failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use engine_component::TypeName;
    use parking_lot::Mutex;

    struct Score(u32);

    impl TypeName for Score {
        fn type_name() -> &'static str {
            "test::Score"
        }
    }

    impl Event for Score {}

    /// A payload that counts how often it was disposed.
    struct Buffer {
        disposed: Arc<AtomicUsize>,
        subscribers_seen: Arc<AtomicUsize>,
        seen_at_dispose: Arc<AtomicUsize>,
    }

    impl Buffer {
        fn new() -> Self {
            Self {
                disposed: Arc::default(),
                subscribers_seen: Arc::default(),
                seen_at_dispose: Arc::default(),
            }
        }
    }

    impl TypeName for Buffer {
        fn type_name() -> &'static str {
            "test::Buffer"
        }
    }

    impl Event for Buffer {}

    impl DisposableEvent for Buffer {
        fn dispose(&self) {
            self.seen_at_dispose
                .store(self.subscribers_seen.load(Ordering::SeqCst), Ordering::SeqCst);
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manifest(
        name: &str,
        register: impl Fn(&mut EventSystemSet) + Send + Sync + 'static,
    ) -> ModuleManifest {
        ModuleManifest::builder(name).event_systems(register).build()
    }

    async fn fail_early(_: Arc<Score>) -> anyhow::Result<()> {
        anyhow::bail!("failed early")
    }

    async fn explode(buffer: Arc<Buffer>) -> anyhow::Result<()> {
        buffer.subscribers_seen.fetch_add(1, Ordering::SeqCst);
        panic!("async subscriber panicked")
    }

    fn buffer_subscribers(count: usize, failing: Option<usize>) -> ModuleManifest {
        manifest("buffers", move |events| {
            for i in 0..count {
                events.subscribe::<Buffer, _>(move |buffer| {
                    buffer.subscribers_seen.fetch_add(1, Ordering::SeqCst);
                    if Some(i) == failing {
                        anyhow::bail!("subscriber {i} failed");
                    }
                    Ok(())
                });
            }
        })
    }

    #[test]
    fn test_publish_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = EventDispatchEngine::new();
        for name in ["a", "b", "c"] {
            let log = Arc::clone(&log);
            engine.load(&manifest(name, move |events| {
                let log = Arc::clone(&log);
                events.subscribe::<Score, _>(move |score| {
                    log.lock().push(format!("{name}:{}", score.0));
                    Ok(())
                });
            }));
        }

        assert_eq!(engine.publish(&Score(7)), 0);
        assert_eq!(*log.lock(), vec!["a:7", "b:7", "c:7"]);
    }

    #[test]
    fn test_failures_do_not_stop_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine = EventDispatchEngine::new();
        let counter = Arc::clone(&calls);
        engine.load(&manifest("mixed", move |events| {
            let (c1, c2) = (Arc::clone(&counter), Arc::clone(&counter));
            events
                .subscribe::<Score, _>(|_| anyhow::bail!("nope"))
                .subscribe::<Score, _>(move |_| {
                    c1.fetch_add(1, Ordering::SeqCst);
                    panic!("worse")
                })
                .subscribe::<Score, _>(move |_| {
                    c2.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
        }));

        assert_eq!(engine.publish(&Score(1)), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dispose_exactly_once_after_all_subscribers() {
        for (count, failing) in [(0, None), (1, None), (4, None), (4, Some(1))] {
            let mut engine = EventDispatchEngine::new();
            engine.load(&buffer_subscribers(count, failing));

            let buffer = Buffer::new();
            let failed = engine.publish_disposable(&buffer, Disposal::Auto);
            assert_eq!(failed, usize::from(failing.is_some()));
            assert_eq!(buffer.disposed.load(Ordering::SeqCst), 1);
            assert_eq!(buffer.seen_at_dispose.load(Ordering::SeqCst), count);
        }
    }

    #[test]
    fn test_keep_skips_disposal() {
        let mut engine = EventDispatchEngine::new();
        engine.load(&buffer_subscribers(2, None));
        let buffer = Buffer::new();
        engine.publish_disposable(&buffer, Disposal::Keep);
        assert_eq!(buffer.disposed.load(Ordering::SeqCst), 0);
        assert_eq!(buffer.subscribers_seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unload_and_reload_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = EventDispatchEngine::new();
        let make = |name: &'static str| {
            let log = Arc::clone(&log);
            manifest(name, move |events| {
                let log = Arc::clone(&log);
                events.subscribe::<Score, _>(move |_| {
                    log.lock().push(name);
                    Ok(())
                });
            })
        };
        let a = make("a");
        let b = make("b");
        engine.load(&a);
        engine.load(&b);
        engine.load(&a);
        assert_eq!(engine.sync_count(Score::type_identity()), 2);

        engine.publish(&Score(0));
        assert_eq!(*log.lock(), vec!["b", "a"]);

        assert!(engine.unload(b.id()));
        assert!(!engine.unload(b.id()));
        assert_eq!(engine.sync_count(Score::type_identity()), 1);
        engine.unload(a.id());
        assert_eq!(engine.publish(&Score(0)), 0);
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_async_joins_all() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let mut engine = EventDispatchEngine::new();
        let log = Arc::clone(&finished);
        engine.load(&manifest("async", move |events| {
            for (i, delay) in [30_u64, 5, 15].into_iter().enumerate() {
                let log = Arc::clone(&log);
                events.subscribe_async::<Score, _, _>(move |_| {
                    let log = Arc::clone(&log);
                    async move {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        log.lock().push(i);
                        Ok(())
                    }
                });
            }
            events.subscribe_async::<Score, _, _>(fail_early);
        }));
        assert_eq!(engine.async_count(Score::type_identity()), 4);

        let failed = engine.publish_async(Score(3)).await;
        assert_eq!(failed, 1);
        let mut done = finished.lock().clone();
        done.sort_unstable();
        assert_eq!(done, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_publish_async_disposes_after_completion() {
        let mut engine = EventDispatchEngine::new();
        engine.load(&manifest("async-buffers", |events| {
            events
                .subscribe_async::<Buffer, _, _>(|buffer| async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    buffer.subscribers_seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .subscribe_async::<Buffer, _, _>(explode);
        }));

        let buffer = Arc::new(Buffer::new());
        let failed = engine
            .publish_disposable_async(Arc::clone(&buffer), Disposal::Auto)
            .await;
        assert_eq!(failed, 1);
        assert_eq!(buffer.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(buffer.seen_at_dispose.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_publish_async_without_subscribers() {
        let engine = EventDispatchEngine::new();
        assert_eq!(engine.publish_async(Score(1)).await, 0);

        let buffer = Arc::new(Buffer::new());
        engine
            .publish_disposable_async(Arc::clone(&buffer), Disposal::Auto)
            .await;
        assert_eq!(buffer.disposed.load(Ordering::SeqCst), 1);
    }
}
