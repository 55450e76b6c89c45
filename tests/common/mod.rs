use std::sync::Arc;
use std::time::Duration;

use d_controller::controller::ControllerRuntime;
use d_controller::reconciler::workspace_mounts_controller;
use d_controller::storage::MemoryStore;
use d_controller::ControllerConfig;
use d_controller::DiscoveredKind;
use d_controller::DynamicObject;
use d_controller::GroupVersionResource;
use d_controller::Object;
use d_controller::ObjectMeta;
use d_controller::ObjectReference;
use d_controller::Resource;
use d_controller::Result;
use d_controller::Workspace;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const CLUSTER: &str = "root:org";
pub const MOUNT_API_VERSION: &str = "proxy.example.io/v1alpha1";
pub const MOUNT_KIND: &str = "KubeCluster";
pub const WAIT: Duration = Duration::from_secs(5);

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

pub fn workspace_key(name: &str) -> String {
    ObjectMeta::new(CLUSTER, None, name).key().to_string()
}

pub fn mounted_workspace(
    name: &str,
    mount: &str,
) -> Workspace {
    Workspace::new(ObjectMeta::new(CLUSTER, None, name))
        .with_mount(ObjectReference::new(MOUNT_API_VERSION, MOUNT_KIND, None, mount))
}

pub fn mount_object(
    name: &str,
    phase: &str,
    url: &str,
) -> DynamicObject {
    DynamicObject::new(&mount_gvr(), MOUNT_KIND, ObjectMeta::new(CLUSTER, None, name))
        .with_field("status", json!({"phase": phase, "URL": url}))
}

pub fn config(name: &str) -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.controller.name = name.to_string();
    config.controller.cache_sync_timeout_ms = 2_000;
    config.queue.base_delay_ms = 100;
    config.queue.max_delay_ms = 1_000;
    config.watch.relist_base_delay_ms = 5;
    config.watch.relist_max_delay_ms = 100;
    config
}

/// A running workspace mounts controller over `store`.
pub struct TestContext {
    pub store: MemoryStore,
    pub runtime: Arc<ControllerRuntime<Workspace>>,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

impl TestContext {
    pub fn start(
        store: MemoryStore,
        config: ControllerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let shared = Arc::new(store.clone());
        let runtime = Arc::new(
            workspace_mounts_controller(
                config,
                shutdown_rx,
                store.lister_watcher(&Workspace::gvr()),
                shared.clone(),
                shared.clone(),
                shared,
            )
            .build()
            .expect("runtime must build"),
        );
        let handle = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run().await }
        });
        Self {
            store,
            runtime,
            shutdown_tx,
            handle,
        }
    }

    pub fn workspace(
        &self,
        name: &str,
    ) -> Workspace {
        self.store
            .get(&Workspace::gvr(), &ObjectMeta::new(CLUSTER, None, name).key())
            .expect("workspace must exist")
    }

    /// Waits until the cache caught up with the store and no key is queued.
    pub async fn settle(
        &self,
        name: &str,
    ) {
        let key = workspace_key(name);
        let settled = wait_until(WAIT, || {
            let stored = self.workspace(name);
            let cached = self.runtime.indexer().get_by_key(&key);
            self.runtime.queue().is_empty()
                && cached.is_some_and(|c| c.resource_version() == stored.resource_version())
        })
        .await;
        assert!(settled, "{name} did not settle");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    pub async fn stop(self) {
        self.shutdown_tx.send(()).expect("runtime must be listening");
        self.handle
            .await
            .expect("runtime task must not panic")
            .expect("runtime must stop cleanly");
    }
}

pub async fn wait_until(
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return condition();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
