use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::Interval;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::DeletedObject;
use super::ListerWatcher;
use super::ResourceEventHandler;
use super::WatchEvent;
use crate::cache::Indexer;
use crate::utils::async_task::sleep_or_shutdown;
use crate::utils::async_task::Backoff;
use crate::Object;
use crate::Result;
use crate::WatchConfig;

/// Why a watch session ended.
enum WatchEnd {
    Shutdown,
    /// History no longer covers our version; a fresh list is required
    Relist,
    /// Stream ended or failed; watch again from the last seen version
    Rewatch { failed: bool },
}

/// Keeps an [`Indexer`] in sync with one resource and notifies handlers of
/// every change.
pub struct Informer<T: Object> {
    name: String,
    lister_watcher: Arc<dyn ListerWatcher<T>>,
    indexer: Arc<Indexer<T>>,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler<T>>>>,
    synced: watch::Sender<bool>,
    resync_period: Option<Duration>,
    relist_base_delay: Duration,
    relist_max_delay: Duration,
}

impl<T: Object> Informer<T> {
    pub fn new(
        name: impl Into<String>,
        lister_watcher: Arc<dyn ListerWatcher<T>>,
        config: &WatchConfig,
        resync_period: Option<Duration>,
    ) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            name: name.into(),
            lister_watcher,
            indexer: Arc::new(Indexer::new()),
            handlers: RwLock::new(Vec::new()),
            synced,
            resync_period,
            relist_base_delay: config.relist_base_delay(),
            relist_max_delay: config.relist_max_delay(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indexer(&self) -> Arc<Indexer<T>> {
        self.indexer.clone()
    }

    /// Subscribes `handler`; if the first list already completed, replays
    /// every cached object to it as an add.
    pub fn add_event_handler(
        &self,
        handler: Arc<dyn ResourceEventHandler<T>>,
    ) {
        let mut handlers = self.handlers.write();
        handlers.push(handler.clone());
        if self.has_synced() {
            for obj in self.indexer.list() {
                handler.on_add(&obj);
            }
        }
    }

    /// Whether the first list has been applied to the cache.
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Waits until the first list has been applied, at most `timeout`.
    pub async fn wait_for_sync(
        &self,
        timeout: Duration,
    ) -> bool {
        let mut rx = self.synced.subscribe();
        let synced = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|synced| *synced)).await,
            Ok(Ok(_))
        );
        synced
    }

    /// Runs list+watch until `shutdown` fires.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let mut backoff = Backoff::new(self.relist_base_delay, self.relist_max_delay);
        let mut resync = self.resync_period.map(|p| interval_at(Instant::now() + p, p));

        'relist: loop {
            let list = tokio::select! {
                _ = shutdown.changed() => break 'relist,
                list = self.lister_watcher.list() => list,
            };
            let list = match list {
                Ok(list) => list,
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(informer = %self.name, ?delay, "list failed: {}", e);
                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        break 'relist;
                    }
                    continue 'relist;
                }
            };

            info!(
                informer = %self.name,
                resource_version = %list.resource_version,
                items = list.items.len(),
                "listed"
            );
            self.replace(list.items);
            self.synced.send_replace(true);
            let mut resource_version = list.resource_version;

            loop {
                match self
                    .watch_once(&mut resource_version, &mut resync, &mut shutdown)
                    .await
                {
                    WatchEnd::Shutdown => break 'relist,
                    WatchEnd::Relist => {
                        info!(informer = %self.name, %resource_version, "watch expired, relisting");
                        continue 'relist;
                    }
                    WatchEnd::Rewatch { failed: false } => {
                        backoff.reset();
                        debug!(informer = %self.name, %resource_version, "watch closed, re-watching");
                    }
                    WatchEnd::Rewatch { failed: true } => {
                        let delay = backoff.next_delay();
                        if sleep_or_shutdown(delay, &mut shutdown).await {
                            break 'relist;
                        }
                    }
                }
            }
        }

        debug!(informer = %self.name, "informer stopped");
        Ok(())
    }

    async fn watch_once(
        &self,
        resource_version: &mut String,
        resync: &mut Option<Interval>,
        shutdown: &mut watch::Receiver<()>,
    ) -> WatchEnd {
        let stream = tokio::select! {
            _ = shutdown.changed() => return WatchEnd::Shutdown,
            stream = self.lister_watcher.watch(resource_version.as_str()) => stream,
        };
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) if e.is_expired() => return WatchEnd::Relist,
            Err(e) => {
                warn!(informer = %self.name, %resource_version, "watch failed: {}", e);
                return WatchEnd::Rewatch { failed: true };
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => return WatchEnd::Shutdown,
                _ = next_resync(resync) => self.resync(),
                event = stream.next() => match event {
                    Some(Ok(event)) => {
                        if let Some(version) = self.apply(event) {
                            *resource_version = version;
                        }
                    }
                    Some(Err(e)) if e.is_expired() => return WatchEnd::Relist,
                    Some(Err(e)) => {
                        warn!(informer = %self.name, %resource_version, "watch stream failed: {}", e);
                        return WatchEnd::Rewatch { failed: true };
                    }
                    None => return WatchEnd::Rewatch { failed: false },
                },
            }
        }
    }

    /// Applies one watch event to the cache and notifies handlers.
    ///
    /// Returns the resource version the event moves the watch to.
    fn apply(
        &self,
        event: WatchEvent<T>,
    ) -> Option<String> {
        match event {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) => {
                let version = obj.resource_version().to_string();
                trace!(informer = %self.name, key = %obj.key(), resource_version = %version, "upsert");
                let obj = Arc::new(obj);
                match self.indexer.upsert(obj.clone()) {
                    Some(old) => self.dispatch(|h| h.on_update(&old, &obj)),
                    None => self.dispatch(|h| h.on_add(&obj)),
                }
                Some(version)
            }
            WatchEvent::Deleted(obj) => {
                let version = obj.resource_version().to_string();
                trace!(informer = %self.name, key = %obj.key(), resource_version = %version, "delete");
                self.indexer.delete(&obj.key().to_string());
                let deleted = DeletedObject::Confirmed(Arc::new(obj));
                self.dispatch(|h| h.on_delete(&deleted));
                Some(version)
            }
            WatchEvent::Bookmark(version) => Some(version),
        }
    }

    /// Replaces the cache with a fresh list, synthesizing the events a
    /// watch would have delivered.
    fn replace(
        &self,
        items: Vec<T>,
    ) {
        let diff = self.indexer.replace(items);
        for obj in &diff.added {
            self.dispatch(|h| h.on_add(obj));
        }
        for (old, new) in &diff.updated {
            self.dispatch(|h| h.on_update(old, new));
        }
        for obj in diff.removed {
            let deleted = DeletedObject::FinalStateUnknown {
                key: obj.key().to_string(),
                obj,
            };
            self.dispatch(|h| h.on_delete(&deleted));
        }
    }

    /// Replays every cached object as an update to itself.
    fn resync(&self) {
        let objs = self.indexer.list();
        debug!(informer = %self.name, items = objs.len(), "resync");
        for obj in &objs {
            self.dispatch(|h| h.on_update(obj, obj));
        }
    }

    fn dispatch(
        &self,
        f: impl Fn(&dyn ResourceEventHandler<T>),
    ) {
        let handlers = self.handlers.read().clone();
        for handler in &handlers {
            f(handler.as_ref());
        }
    }
}

async fn next_resync(resync: &mut Option<Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
