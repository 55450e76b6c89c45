use std::sync::Arc;

use super::*;
use crate::queue::default_controller_rate_limiter;
use crate::reconciler::workspace_mount_index;
use crate::reconciler::WORKSPACE_MOUNTS_REFERENCE_INDEX;
use crate::test_utils::mount_gvr;
use crate::test_utils::mount_object;
use crate::test_utils::mounted_workspace;
use crate::test_utils::workspace;
use crate::BuiltinApis;
use crate::ObjectMeta;
use crate::RateLimiterConfig;
use crate::Workspace;

struct Fixture {
    queue: Arc<WorkQueue>,
    indexer: Arc<Indexer<Workspace>>,
    router: EventRouter<Workspace>,
}

fn setup() -> Fixture {
    let queue = WorkQueue::new(
        "router-test",
        default_controller_rate_limiter(&RateLimiterConfig::default()),
    );
    let indexer = Arc::new(Indexer::new());
    indexer
        .add_indexer(
            WORKSPACE_MOUNTS_REFERENCE_INDEX,
            workspace_mount_index(Arc::new(BuiltinApis::default())),
        )
        .unwrap();
    let router = EventRouter::new(
        "router-test",
        queue.clone(),
        indexer.clone(),
        WORKSPACE_MOUNTS_REFERENCE_INDEX,
    );
    Fixture {
        queue,
        indexer,
        router,
    }
}

/// Takes every queued key, sorted.
async fn drain(queue: &WorkQueue) -> Vec<String> {
    let mut keys = Vec::new();
    while !queue.is_empty() {
        if let Some(key) = queue.get().await {
            queue.done(&key);
            keys.push(key);
        }
    }
    keys.sort();
    keys
}

fn versioned(
    obj: DynamicObject,
    resource_version: &str,
) -> Arc<DynamicObject> {
    let mut obj = obj;
    obj.metadata.resource_version = resource_version.to_string();
    Arc::new(obj)
}

#[tokio::test]
async fn test_primary_add_and_update_enqueue_own_key() {
    let f = setup();
    let ws = Arc::new(workspace("ws1"));

    ResourceEventHandler::on_add(&f.router, &ws);
    ResourceEventHandler::on_update(&f.router, &ws, &ws);
    assert_eq!(drain(&f.queue).await, vec![ws.key().to_string()]);

    ResourceEventHandler::on_update(&f.router, &ws, &ws);
    assert_eq!(drain(&f.queue).await, vec![ws.key().to_string()]);
}

#[tokio::test]
async fn test_primary_delete_enqueues_nothing() {
    let f = setup();
    let ws = Arc::new(workspace("ws1"));

    ResourceEventHandler::on_delete(&f.router, &DeletedObject::Confirmed(ws));
    assert!(f.queue.is_empty());
}

#[tokio::test]
async fn test_secondary_event_enqueues_every_referencing_workspace() {
    let f = setup();
    f.indexer.upsert(mounted_workspace("ws1", "c1"));
    f.indexer.upsert(mounted_workspace("ws2", "c1"));
    f.indexer.upsert(mounted_workspace("ws3", "c2"));
    f.indexer.upsert(workspace("ws4"));

    let c1 = versioned(mount_object("c1", Some("Ready"), None), "7");
    GvrEventHandler::on_add(&f.router, &mount_gvr(), &c1);

    assert_eq!(
        drain(&f.queue).await,
        vec![
            workspace("ws1").key().to_string(),
            workspace("ws2").key().to_string(),
        ]
    );
}

#[tokio::test]
async fn test_secondary_event_without_referents_is_ignored() {
    let f = setup();
    f.indexer.upsert(mounted_workspace("ws1", "c1"));

    let unrelated = versioned(mount_object("c9", None, None), "3");
    GvrEventHandler::on_add(&f.router, &mount_gvr(), &unrelated);

    let mut other_tenant = mount_object("c1", None, None);
    other_tenant.metadata = ObjectMeta::new("root:other", None, "c1");
    GvrEventHandler::on_add(&f.router, &mount_gvr(), &Arc::new(other_tenant));

    assert!(f.queue.is_empty());
}

#[tokio::test]
async fn test_secondary_resync_is_skipped() {
    let f = setup();
    f.indexer.upsert(mounted_workspace("ws1", "c1"));

    let old = versioned(mount_object("c1", Some("Initializing"), None), "4");
    GvrEventHandler::on_update(&f.router, &mount_gvr(), &old, &old);
    assert!(f.queue.is_empty());

    let new = versioned(mount_object("c1", Some("Ready"), None), "5");
    GvrEventHandler::on_update(&f.router, &mount_gvr(), &old, &new);
    assert_eq!(drain(&f.queue).await, vec![workspace("ws1").key().to_string()]);
}

#[tokio::test]
async fn test_secondary_delete_enqueues_referencing_workspace() {
    let f = setup();
    f.indexer.upsert(mounted_workspace("ws1", "c1"));

    let gone = versioned(mount_object("c1", Some("Ready"), None), "9");
    GvrEventHandler::on_delete(
        &f.router,
        &mount_gvr(),
        &DeletedObject::FinalStateUnknown {
            key: gone.key().to_string(),
            obj: gone.clone(),
        },
    );
    assert_eq!(drain(&f.queue).await, vec![workspace("ws1").key().to_string()]);
}

#[tokio::test]
async fn test_unknown_index_enqueues_nothing() {
    let f = setup();
    f.indexer.upsert(mounted_workspace("ws1", "c1"));
    let router = EventRouter::new("router-test", f.queue.clone(), f.indexer.clone(), "missing");

    let c1 = versioned(mount_object("c1", None, None), "2");
    GvrEventHandler::on_add(&router, &mount_gvr(), &c1);
    assert!(f.queue.is_empty());
}
