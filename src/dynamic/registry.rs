use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Discovery;
use super::DiscoveryEvent;
use super::DynamicClient;
use super::GvrEventHandler;
use crate::informer::DeletedObject;
use crate::informer::Informer;
use crate::informer::ResourceEventHandler;
use crate::metrics::DYNAMIC_WATCHES;
use crate::utils::async_task::sleep_or_shutdown;
use crate::utils::async_task::Backoff;
use crate::BuiltinApis;
use crate::DiscoveredKind;
use crate::DynamicObject;
use crate::GroupVersionResource;
use crate::Result;
use crate::WatchConfig;

type Sinks = Arc<RwLock<Vec<Arc<dyn GvrEventHandler>>>>;

/// Forwards one kind's informer events, tagged with the kind, to every sink.
struct GvrDispatch {
    gvr: GroupVersionResource,
    sinks: Sinks,
    /// Cleared when the watch stops; later events are dropped
    active: Arc<AtomicBool>,
}

impl GvrDispatch {
    fn each(
        &self,
        f: impl Fn(&dyn GvrEventHandler),
    ) {
        if !self.active.load(Ordering::Acquire) {
            trace!(gvr = %self.gvr, "dropping event of stopped watch");
            return;
        }
        let sinks = self.sinks.read().clone();
        for sink in &sinks {
            f(sink.as_ref());
        }
    }
}

impl ResourceEventHandler<DynamicObject> for GvrDispatch {
    fn on_add(
        &self,
        obj: &Arc<DynamicObject>,
    ) {
        self.each(|s| s.on_add(&self.gvr, obj));
    }

    fn on_update(
        &self,
        old: &Arc<DynamicObject>,
        new: &Arc<DynamicObject>,
    ) {
        self.each(|s| s.on_update(&self.gvr, old, new));
    }

    fn on_delete(
        &self,
        obj: &DeletedObject<DynamicObject>,
    ) {
        self.each(|s| s.on_delete(&self.gvr, obj));
    }
}

struct Registration {
    kind: DiscoveredKind,
    informer: Arc<Informer<DynamicObject>>,
    active: Arc<AtomicBool>,
    stop_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

/// Keeps exactly one informer per discovered kind and multiplexes their
/// events into the registered [`GvrEventHandler`]s.
pub struct DynamicWatchRegistry {
    controller: String,
    client: Arc<dyn DynamicClient>,
    builtin: Arc<BuiltinApis>,
    config: WatchConfig,
    sinks: Sinks,
    registrations: DashMap<GroupVersionResource, Registration>,
}

impl DynamicWatchRegistry {
    pub fn new(
        controller: impl Into<String>,
        client: Arc<dyn DynamicClient>,
        builtin: Arc<BuiltinApis>,
        config: WatchConfig,
    ) -> Self {
        Self {
            controller: controller.into(),
            client,
            builtin,
            config,
            sinks: Arc::new(RwLock::new(Vec::new())),
            registrations: DashMap::new(),
        }
    }

    /// Subscribes `sink` to every current and future watch.
    ///
    /// Objects already cached by running watches are replayed as adds.
    pub fn add_handler(
        &self,
        sink: Arc<dyn GvrEventHandler>,
    ) {
        self.sinks.write().push(sink.clone());
        for entry in self.registrations.iter() {
            let registration = entry.value();
            if !registration.informer.has_synced() {
                continue;
            }
            for obj in registration.informer.indexer().list() {
                sink.on_add(entry.key(), &obj);
            }
        }
    }

    /// Starts watching `kind` unless it is already watched or filtered out.
    ///
    /// Returns whether a new watch was started. Must be called within a
    /// Tokio runtime.
    pub fn start_watch(
        &self,
        kind: DiscoveredKind,
    ) -> bool {
        let gvr = kind.gvr.clone();
        if !self.config.watch_builtin_kinds && self.builtin.is_builtin(&gvr.group, &gvr.resource) {
            debug!(controller = %self.controller, %gvr, "skipping built-in kind");
            return false;
        }

        let started = match self.registrations.entry(gvr.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                let informer = Arc::new(Informer::new(
                    gvr.to_string(),
                    self.client.resource(&gvr),
                    &self.config,
                    None,
                ));
                let active = Arc::new(AtomicBool::new(true));
                informer.add_event_handler(Arc::new(GvrDispatch {
                    gvr: gvr.clone(),
                    sinks: self.sinks.clone(),
                    active: active.clone(),
                }));

                let (stop_tx, stop_rx) = watch::channel(());
                let run = informer.clone().run(stop_rx);
                let name = gvr.to_string();
                let handle = tokio::spawn(async move {
                    if let Err(e) = run.await {
                        warn!(gvr = %name, "dynamic watch stopped with error: {:?}", e);
                    }
                });

                entry.insert(Registration {
                    kind,
                    informer,
                    active,
                    stop_tx,
                    handle,
                });
                true
            }
        };

        if started {
            info!(controller = %self.controller, %gvr, "started dynamic watch");
            self.update_gauge();
        }
        started
    }

    /// Stops the watch of `gvr`. Returns whether one was running.
    pub fn stop_watch(
        &self,
        gvr: &GroupVersionResource,
    ) -> bool {
        let Some((_, registration)) = self.registrations.remove(gvr) else {
            return false;
        };
        registration.active.store(false, Ordering::Release);
        let _ = registration.stop_tx.send(());
        info!(controller = %self.controller, %gvr, "stopped dynamic watch");
        self.update_gauge();
        true
    }

    pub fn is_watching(
        &self,
        gvr: &GroupVersionResource,
    ) -> bool {
        self.registrations.contains_key(gvr)
    }

    pub fn watched_kinds(&self) -> Vec<DiscoveredKind> {
        self.registrations
            .iter()
            .map(|entry| entry.value().kind.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Whether every running watch has completed its first list.
    pub fn has_synced(&self) -> bool {
        self.registrations
            .iter()
            .all(|entry| entry.value().informer.has_synced())
    }

    /// Follows `discovery` until `shutdown` fires, then stops every watch.
    ///
    /// Every (re)subscription resets the watched set to the kinds discovery
    /// currently lists, so changes lost while lagging are recovered.
    pub async fn run(
        self: Arc<Self>,
        discovery: Arc<dyn Discovery>,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let mut backoff = Backoff::new(
            self.config.relist_base_delay(),
            self.config.relist_max_delay(),
        );

        'subscribe: loop {
            let subscription = tokio::select! {
                _ = shutdown.changed() => break 'subscribe,
                subscription = discovery.subscribe() => subscription,
            };
            let mut changes = match subscription {
                Ok(subscription) => {
                    backoff.reset();
                    self.sync_kinds(subscription.current);
                    subscription.changes
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(controller = %self.controller, ?delay, "discovery subscribe failed: {}", e);
                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        break 'subscribe;
                    }
                    continue 'subscribe;
                }
            };

            'changes: loop {
                let reason = tokio::select! {
                    _ = shutdown.changed() => break 'subscribe,
                    change = changes.next() => match change {
                        Some(Ok(DiscoveryEvent::Appeared(kind))) => {
                            self.start_watch(kind);
                            continue 'changes;
                        }
                        Some(Ok(DiscoveryEvent::Disappeared(gvr))) => {
                            self.stop_watch(&gvr);
                            continue 'changes;
                        }
                        Some(Err(e)) => format!("discovery feed lost events: {e}"),
                        None => "discovery feed closed".to_string(),
                    },
                };

                let delay = backoff.next_delay();
                warn!(controller = %self.controller, ?delay, "{}, resubscribing", reason);
                if sleep_or_shutdown(delay, &mut shutdown).await {
                    break 'subscribe;
                }
                continue 'subscribe;
            }
        }

        self.shutdown(Duration::from_secs(5)).await;
        Ok(())
    }

    /// Makes the watched set exactly `current`: stops watches of kinds that
    /// are no longer listed and starts the missing ones.
    fn sync_kinds(
        &self,
        current: Vec<DiscoveredKind>,
    ) {
        let listed: HashSet<GroupVersionResource> = current.iter().map(|kind| kind.gvr.clone()).collect();
        let stale: Vec<GroupVersionResource> = self
            .registrations
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|gvr| !listed.contains(gvr))
            .collect();
        for gvr in stale {
            self.stop_watch(&gvr);
        }
        for kind in current {
            self.start_watch(kind);
        }
    }

    /// Stops every watch and waits up to `grace` for each to finish.
    pub async fn shutdown(
        &self,
        grace: Duration,
    ) {
        let kinds: Vec<_> = self
            .registrations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for gvr in kinds {
            if let Some((_, registration)) = self.registrations.remove(&gvr) {
                registration.active.store(false, Ordering::Release);
                let _ = registration.stop_tx.send(());
                if tokio::time::timeout(grace, registration.handle).await.is_err() {
                    warn!(controller = %self.controller, %gvr, "dynamic watch did not stop in time");
                }
            }
        }
        self.update_gauge();
        debug!(controller = %self.controller, "dynamic watch registry stopped");
    }

    fn update_gauge(&self) {
        DYNAMIC_WATCHES
            .with_label_values(&[&self.controller])
            .set(self.registrations.len() as i64);
    }
}
