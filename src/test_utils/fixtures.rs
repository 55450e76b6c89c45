use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use crate::dynamic::GvrEventHandler;
use crate::informer::DeletedObject;
use crate::informer::ResourceEventHandler;
use crate::ControllerConfig;
use crate::DiscoveredKind;
use crate::DynamicObject;
use crate::GroupVersionResource;
use crate::Object;
use crate::ObjectMeta;
use crate::ObjectReference;
use crate::Workspace;

pub const TEST_CLUSTER: &str = "root:org";
pub const MOUNT_API_VERSION: &str = "proxy.example.io/v1alpha1";
pub const MOUNT_KIND: &str = "KubeCluster";

pub fn mount_gvr() -> GroupVersionResource {
    GroupVersionResource::new("proxy.example.io", "v1alpha1", "kubeclusters")
}

pub fn mount_kind() -> DiscoveredKind {
    DiscoveredKind {
        gvr: mount_gvr(),
        kind: MOUNT_KIND.to_string(),
        namespaced: false,
    }
}

pub fn workspace(name: &str) -> Workspace {
    Workspace::new(ObjectMeta::new(TEST_CLUSTER, None, name))
}

/// A workspace mounted on the cluster-scoped `KubeCluster` named `mount`.
pub fn mounted_workspace(
    name: &str,
    mount: &str,
) -> Workspace {
    workspace(name).with_mount(ObjectReference::new(MOUNT_API_VERSION, MOUNT_KIND, None, mount))
}

pub fn mount_object(
    name: &str,
    phase: Option<&str>,
    url: Option<&str>,
) -> DynamicObject {
    let mut status = serde_json::Map::new();
    if let Some(phase) = phase {
        status.insert("phase".to_string(), json!(phase));
    }
    if let Some(url) = url {
        status.insert("URL".to_string(), json!(url));
    }
    DynamicObject::new(&mount_gvr(), MOUNT_KIND, ObjectMeta::new(TEST_CLUSTER, None, name))
        .with_field("status", serde_json::Value::Object(status))
}

/// Small delays so that relists and retries happen within a test.
pub fn test_config() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.controller.name = "test-controller".to_string();
    config.controller.workers = 2;
    config.controller.cache_sync_timeout_ms = 2_000;
    config.queue.base_delay_ms = 1;
    config.queue.max_delay_ms = 50;
    config.watch.relist_base_delay_ms = 5;
    config.watch.relist_max_delay_ms = 50;
    config
}

/// Records every notification as `"<event>:<key>"`.
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(
        &self,
        event: &str,
    ) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    fn record(
        &self,
        event: String,
    ) {
        self.events.lock().push(event);
    }
}

impl<T: Object> ResourceEventHandler<T> for RecordingHandler {
    fn on_add(
        &self,
        obj: &Arc<T>,
    ) {
        self.record(format!("add:{}", obj.key()));
    }

    fn on_update(
        &self,
        _old: &Arc<T>,
        new: &Arc<T>,
    ) {
        self.record(format!("update:{}", new.key()));
    }

    fn on_delete(
        &self,
        obj: &DeletedObject<T>,
    ) {
        let event = if obj.is_final_state_unknown() {
            "delete-unknown"
        } else {
            "delete"
        };
        self.record(format!("{event}:{}", obj.object().key()));
    }
}

impl GvrEventHandler for RecordingHandler {
    fn on_add(
        &self,
        gvr: &GroupVersionResource,
        obj: &Arc<DynamicObject>,
    ) {
        self.record(format!("add:{}:{}", gvr.resource, obj.key()));
    }

    fn on_update(
        &self,
        gvr: &GroupVersionResource,
        _old: &Arc<DynamicObject>,
        new: &Arc<DynamicObject>,
    ) {
        self.record(format!("update:{}:{}", gvr.resource, new.key()));
    }

    fn on_delete(
        &self,
        gvr: &GroupVersionResource,
        obj: &DeletedObject<DynamicObject>,
    ) {
        self.record(format!("delete:{}:{}", gvr.resource, obj.object().key()));
    }
}
