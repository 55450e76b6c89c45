use std::time::Duration;

use d_controller::storage::MemoryStore;
use d_controller::Resource;
use d_controller::Workspace;
use d_controller::WorkspacePhase;
use d_controller::REASON_MOUNT_NOT_READY;
use d_controller::REASON_MOUNT_OBJECT_NOT_FOUND;
use d_controller::WORKSPACE_MOUNT_READY;

use crate::common::config;
use crate::common::mount_gvr;
use crate::common::mount_kind;
use crate::common::mount_object;
use crate::common::mounted_workspace;
use crate::common::wait_until;
use crate::common::TestContext;
use crate::common::WAIT;

fn reason(ws: &Workspace) -> Option<String> {
    ws.status
        .condition(WORKSPACE_MOUNT_READY)
        .and_then(|c| c.reason.clone())
}

/// A workspace is reconciled again when the object it mounts appears, without
/// the workspace itself changing.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mount_created_after_workspace_triggers_reconcile() {
    crate::enable_logger();
    let store = MemoryStore::new();
    store.add_kind(mount_kind());
    store
        .create(
            &Workspace::gvr(),
            &mounted_workspace("w1", "s1").with_phase(WorkspacePhase::Initializing),
        )
        .unwrap();
    let ctx = TestContext::start(store, config("late-mount"));

    assert!(wait_until(WAIT, || ctx.workspace("w1").status.phase == WorkspacePhase::Unavailable).await);
    assert_eq!(
        reason(&ctx.workspace("w1")).as_deref(),
        Some(REASON_MOUNT_OBJECT_NOT_FOUND)
    );
    ctx.settle("w1").await;

    ctx.store
        .create(&mount_gvr(), &mount_object("s1", "Ready", "https://s1.example.io"))
        .unwrap();

    assert!(
        wait_until(WAIT, || {
            let ws = ctx.workspace("w1");
            ws.status.phase == WorkspacePhase::Ready && ws.spec.url == "https://s1.example.io"
        })
        .await
    );
    assert_eq!(reason(&ctx.workspace("w1")), None);

    ctx.stop().await;
}

/// Once a kind leaves discovery its events no longer reach the workspaces
/// referencing it.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removed_kind_no_longer_routes() {
    crate::enable_logger();
    let store = MemoryStore::new();
    store.add_kind(mount_kind());
    store
        .create(&mount_gvr(), &mount_object("s2", "Provisioning", ""))
        .unwrap();
    store
        .create(
            &Workspace::gvr(),
            &mounted_workspace("w2", "s2").with_phase(WorkspacePhase::Initializing),
        )
        .unwrap();
    let ctx = TestContext::start(store, config("removed-kind"));

    assert!(wait_until(WAIT, || reason(&ctx.workspace("w2")).as_deref() == Some(REASON_MOUNT_NOT_READY)).await);
    ctx.settle("w2").await;

    let registry = ctx.runtime.registry().unwrap().clone();
    assert!(registry.is_watching(&mount_gvr()));
    ctx.store.remove_kind(&mount_gvr());
    assert!(wait_until(WAIT, || !registry.is_watching(&mount_gvr())).await);

    ctx.store
        .update(&mount_gvr(), &mount_object("s2", "Ready", "https://s2.example.io"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let ws = ctx.workspace("w2");
    assert_eq!(ws.status.phase, WorkspacePhase::Unavailable);
    assert!(ws.spec.url.is_empty());

    ctx.stop().await;
}

/// With the kind gone, the periodic re-sync of the workspace is what picks
/// up the mount's new state.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resync_still_reconciles_after_kind_removal() {
    crate::enable_logger();
    let store = MemoryStore::new();
    store.add_kind(mount_kind());
    store
        .create(&mount_gvr(), &mount_object("s3", "Provisioning", ""))
        .unwrap();
    store
        .create(
            &Workspace::gvr(),
            &mounted_workspace("w3", "s3").with_phase(WorkspacePhase::Initializing),
        )
        .unwrap();
    let mut config = config("removed-kind-resync");
    config.controller.resync_period_ms = 100;
    let ctx = TestContext::start(store, config);

    assert!(wait_until(WAIT, || ctx.workspace("w3").status.phase == WorkspacePhase::Unavailable).await);
    let registry = ctx.runtime.registry().unwrap().clone();
    ctx.store.remove_kind(&mount_gvr());
    assert!(wait_until(WAIT, || !registry.is_watching(&mount_gvr())).await);

    ctx.store
        .update(&mount_gvr(), &mount_object("s3", "Ready", "https://s3.example.io"))
        .unwrap();

    assert!(
        wait_until(WAIT, || {
            let ws = ctx.workspace("w3");
            ws.status.phase == WorkspacePhase::Ready && ws.spec.url == "https://s3.example.io"
        })
        .await
    );

    ctx.stop().await;
}
