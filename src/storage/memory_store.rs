use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use nanoid::nanoid;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use tracing::warn;

use crate::committer::PatchApplier;
use crate::committer::SubResource;
use crate::dynamic::Discovery;
use crate::dynamic::DiscoveryEvent;
use crate::dynamic::DiscoverySubscription;
use crate::dynamic::DynamicClient;
use crate::informer::ListerWatcher;
use crate::informer::ObjectList;
use crate::informer::WatchEvent;
use crate::informer::WatchStream;
use crate::DiscoveredKind;
use crate::DynamicObject;
use crate::Error;
use crate::GroupVersionResource;
use crate::Object;
use crate::ObjectKey;
use crate::ObjectMeta;
use crate::ObjectRef;
use crate::Result;
use crate::StoreError;
use crate::WatchError;

/// Watch events retained per resource before older ones are compacted
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

pub(crate) const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
struct Recorded {
    version: u64,
    kind: EventKind,
    object: Value,
}

struct Table {
    objects: BTreeMap<String, Value>,
    history: VecDeque<Recorded>,
    /// Highest version whose event was dropped from `history`
    compacted_through: u64,
    tx: broadcast::Sender<Recorded>,
}

impl Table {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            objects: BTreeMap::new(),
            history: VecDeque::new(),
            compacted_through: 0,
            tx,
        }
    }

    fn record(
        &mut self,
        event: Recorded,
        history_limit: usize,
    ) {
        self.history.push_back(event.clone());
        while self.history.len() > history_limit {
            if let Some(dropped) = self.history.pop_front() {
                self.compacted_through = dropped.version;
            }
        }
        let _ = self.tx.send(event);
    }
}

struct StoreState {
    version: u64,
    history_limit: usize,
    tables: HashMap<GroupVersionResource, Table>,
    kinds: BTreeMap<GroupVersionResource, DiscoveredKind>,
    discovery_tx: broadcast::Sender<DiscoveryEvent>,
    injected_failures: HashMap<SubResource, VecDeque<StoreError>>,
    patch_calls: HashMap<SubResource, usize>,
}

impl StoreState {
    fn table(
        &mut self,
        gvr: &GroupVersionResource,
    ) -> &mut Table {
        self.tables.entry(gvr.clone()).or_insert_with(Table::new)
    }

    fn get(
        &self,
        gvr: &GroupVersionResource,
        key: &str,
    ) -> Result<&Value> {
        self.tables
            .get(gvr)
            .and_then(|t| t.objects.get(key))
            .ok_or_else(|| {
                StoreError::NotFound {
                    key: format!("{gvr} {key}"),
                }
                .into()
            })
    }

    /// Stamps a new resource version on `object`, stores it and records the
    /// event.
    fn write(
        &mut self,
        gvr: &GroupVersionResource,
        kind: EventKind,
        mut object: Value,
        mut meta: ObjectMeta,
    ) -> Result<Value> {
        self.version += 1;
        let version = self.version;
        meta.resource_version = version.to_string();
        set_meta(&mut object, &meta)?;

        let key = meta.key().to_string();
        let history_limit = self.history_limit;
        let table = self.table(gvr);
        match kind {
            EventKind::Deleted => {
                table.objects.remove(&key);
            }
            EventKind::Added | EventKind::Modified => {
                table.objects.insert(key, object.clone());
            }
        }
        table.record(
            Recorded {
                version,
                kind,
                object: object.clone(),
            },
            history_limit,
        );
        Ok(object)
    }
}

/// In-process object store serving every interface the controller consumes.
///
/// Objects are kept as JSON per resource. Every write gets a store-wide,
/// strictly increasing resource version; each resource retains a bounded
/// history of events to serve watches from an earlier version.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        let (discovery_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Arc::new(Mutex::new(StoreState {
                version: 0,
                history_limit: history_limit.max(1),
                tables: HashMap::new(),
                kinds: BTreeMap::new(),
                discovery_tx,
                injected_failures: HashMap::new(),
                patch_calls: HashMap::new(),
            })),
        }
    }

    /// Makes `kind` discoverable.
    pub fn add_kind(
        &self,
        kind: DiscoveredKind,
    ) {
        let mut state = self.state.lock();
        if state.kinds.insert(kind.gvr.clone(), kind.clone()).is_none() {
            debug!(gvr = %kind.gvr, "kind appeared");
            let _ = state.discovery_tx.send(DiscoveryEvent::Appeared(kind));
        }
    }

    /// Removes `gvr` from discovery. Stored objects are kept.
    pub fn remove_kind(
        &self,
        gvr: &GroupVersionResource,
    ) {
        let mut state = self.state.lock();
        if state.kinds.remove(gvr).is_some() {
            debug!(%gvr, "kind disappeared");
            let _ = state.discovery_tx.send(DiscoveryEvent::Disappeared(gvr.clone()));
        }
    }

    /// Currently discoverable kinds.
    pub fn kinds(&self) -> Vec<DiscoveredKind> {
        self.state.lock().kinds.values().cloned().collect()
    }

    pub fn create<T: Object + Serialize + DeserializeOwned>(
        &self,
        gvr: &GroupVersionResource,
        obj: &T,
    ) -> Result<T> {
        let object = serde_json::to_value(obj)?;
        let mut meta = obj.meta().clone();
        let key = meta.key().to_string();

        let mut state = self.state.lock();
        if state.get(gvr, &key).is_ok() {
            return Err(StoreError::Other(format!("{gvr} {key} already exists")).into());
        }
        meta.uid = nanoid!();
        meta.generation = 1;
        let stored = state.write(gvr, EventKind::Added, object, meta)?;
        Ok(serde_json::from_value(stored)?)
    }

    /// Replaces a whole object, conditioned on its resource version unless
    /// that is empty.
    pub fn update<T: Object + Serialize + DeserializeOwned>(
        &self,
        gvr: &GroupVersionResource,
        obj: &T,
    ) -> Result<T> {
        let mut object = serde_json::to_value(obj)?;
        let key = obj.key().to_string();

        let mut state = self.state.lock();
        let current = state.get(gvr, &key)?;
        let mut meta = meta_of(current)?;
        let expected = obj.resource_version();
        if !expected.is_empty() && expected != meta.resource_version {
            return Err(StoreError::Conflict {
                key,
                expected: expected.to_string(),
            }
            .into());
        }
        if current.get("spec") != object.get("spec") {
            meta.generation += 1;
        }
        let update = obj.meta();
        meta.labels = update.labels.clone();
        meta.annotations = update.annotations.clone();
        if let Some(fields) = object.as_object_mut() {
            fields.remove("metadata");
        }
        let stored = state.write(gvr, EventKind::Modified, object, meta)?;
        Ok(serde_json::from_value(stored)?)
    }

    pub fn delete(
        &self,
        gvr: &GroupVersionResource,
        key: &ObjectKey,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let current = state.get(gvr, &key.to_string())?.clone();
        let meta = meta_of(&current)?;
        state.write(gvr, EventKind::Deleted, current, meta)?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        gvr: &GroupVersionResource,
        key: &ObjectKey,
    ) -> Result<T> {
        let state = self.state.lock();
        let object = state.get(gvr, &key.to_string())?;
        Ok(serde_json::from_value(object.clone())?)
    }

    /// Drops the retained event history of `gvr`; watches from any earlier
    /// version fail with `Expired`.
    pub fn compact(
        &self,
        gvr: &GroupVersionResource,
    ) {
        let mut state = self.state.lock();
        let version = state.version;
        let table = state.table(gvr);
        table.history.clear();
        table.compacted_through = version;
    }

    /// Makes the next patch of `sub_resource` fail with `error`.
    pub fn inject_patch_failure(
        &self,
        sub_resource: SubResource,
        error: StoreError,
    ) {
        self.state
            .lock()
            .injected_failures
            .entry(sub_resource)
            .or_default()
            .push_back(error);
    }

    /// Number of patch attempts against `sub_resource`, failed ones included.
    pub fn patch_calls(
        &self,
        sub_resource: SubResource,
    ) -> usize {
        self.state
            .lock()
            .patch_calls
            .get(&sub_resource)
            .copied()
            .unwrap_or(0)
    }

    /// Typed List/Watch access to `gvr`.
    pub fn lister_watcher<T>(
        &self,
        gvr: &GroupVersionResource,
    ) -> Arc<dyn ListerWatcher<T>>
    where
        T: Object + DeserializeOwned,
    {
        Arc::new(ResourceClient::<T> {
            store: self.clone(),
            gvr: gvr.clone(),
            _marker: PhantomData,
        })
    }
}

struct ResourceClient<T> {
    store: MemoryStore,
    gvr: GroupVersionResource,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T> ListerWatcher<T> for ResourceClient<T>
where
    T: Object + DeserializeOwned,
{
    async fn list(&self) -> Result<ObjectList<T>> {
        let state = self.store.state.lock();
        let items = match state.tables.get(&self.gvr) {
            Some(table) => table
                .objects
                .values()
                .map(|object| serde_json::from_value(object.clone()))
                .collect::<std::result::Result<Vec<T>, _>>()?,
            None => Vec::new(),
        };
        Ok(ObjectList {
            items,
            resource_version: state.version.to_string(),
        })
    }

    async fn watch(
        &self,
        resource_version: &str,
    ) -> Result<WatchStream<T>> {
        let from: u64 = if resource_version.is_empty() {
            0
        } else {
            resource_version.parse::<u64>().map_err(|_| {
                StoreError::Other(format!("invalid resource version {resource_version:?}"))
            })?
        };

        let (backlog, rx) = {
            let mut state = self.store.state.lock();
            let table = state.table(&self.gvr);
            if from < table.compacted_through {
                return Err(WatchError::Expired {
                    resource_version: resource_version.to_string(),
                }
                .into());
            }
            let backlog: Vec<Recorded> = table
                .history
                .iter()
                .filter(|event| event.version > from)
                .cloned()
                .collect();
            (backlog, table.tx.subscribe())
        };

        let live = BroadcastStream::new(rx).map(|item| match item {
            Ok(event) => Ok(event),
            Err(BroadcastStreamRecvError::Lagged(n)) => Err(Error::from(WatchError::Lagged(n))),
        });
        Ok(stream::iter(backlog.into_iter().map(Ok::<Recorded, Error>))
            .chain(live)
            .map(|item| item.and_then(decode::<T>))
            .boxed())
    }
}

#[async_trait]
impl DynamicClient for MemoryStore {
    fn resource(
        &self,
        gvr: &GroupVersionResource,
    ) -> Arc<dyn ListerWatcher<DynamicObject>> {
        self.lister_watcher::<DynamicObject>(gvr)
    }

    async fn get(
        &self,
        gvr: &GroupVersionResource,
        key: &ObjectKey,
    ) -> Result<DynamicObject> {
        MemoryStore::get(self, gvr, key)
    }
}

#[async_trait]
impl Discovery for MemoryStore {
    async fn subscribe(&self) -> Result<DiscoverySubscription> {
        let state = self.state.lock();
        let current: Vec<DiscoveredKind> = state.kinds.values().cloned().collect();
        let rx = state.discovery_tx.subscribe();
        drop(state);

        let changes = BroadcastStream::new(rx).map(|item| {
            item.map_err(|BroadcastStreamRecvError::Lagged(n)| {
                warn!("discovery subscriber lagged behind by {} events", n);
                Error::from(WatchError::Lagged(n))
            })
        });
        Ok(DiscoverySubscription {
            current,
            changes: changes.boxed(),
        })
    }
}

#[async_trait]
impl PatchApplier for MemoryStore {
    async fn apply_optimistic(
        &self,
        target: &ObjectRef,
        sub_resource: SubResource,
        expected_version: &str,
        patch: &Value,
    ) -> Result<String> {
        let mut state = self.state.lock();
        *state.patch_calls.entry(sub_resource).or_default() += 1;
        if let Some(error) = state
            .injected_failures
            .get_mut(&sub_resource)
            .and_then(VecDeque::pop_front)
        {
            return Err(error.into());
        }

        let key = target.key.to_string();
        let mut object = state.get(&target.gvr, &key)?.clone();
        let mut meta = meta_of(&object)?;
        if (!target.uid.is_empty() && target.uid != meta.uid) || expected_version != meta.resource_version {
            return Err(StoreError::Conflict {
                key,
                expected: expected_version.to_string(),
            }
            .into());
        }

        let Some(fields) = object.as_object_mut() else {
            return Err(StoreError::Other(format!("{key} is not an object")).into());
        };
        let field = fields
            .entry(sub_resource.field())
            .or_insert_with(|| Value::Object(Map::new()));
        json_patch::merge(field, patch);
        if sub_resource == SubResource::Spec {
            meta.generation += 1;
        }

        let stored = state.write(&target.gvr, EventKind::Modified, object, meta)?;
        Ok(meta_of(&stored)?.resource_version)
    }
}

fn meta_of(object: &Value) -> Result<ObjectMeta> {
    let meta = object
        .get("metadata")
        .cloned()
        .ok_or_else(|| StoreError::Other("object has no metadata".to_string()))?;
    Ok(serde_json::from_value(meta)?)
}

fn set_meta(
    object: &mut Value,
    meta: &ObjectMeta,
) -> Result<()> {
    let Some(fields) = object.as_object_mut() else {
        return Err(StoreError::Other("object is not a JSON object".to_string()).into());
    };
    fields.insert("metadata".to_string(), serde_json::to_value(meta)?);
    Ok(())
}

fn decode<T: DeserializeOwned>(event: Recorded) -> Result<WatchEvent<T>> {
    let obj = serde_json::from_value(event.object)?;
    Ok(match event.kind {
        EventKind::Added => WatchEvent::Added(obj),
        EventKind::Modified => WatchEvent::Modified(obj),
        EventKind::Deleted => WatchEvent::Deleted(obj),
    })
}
