use d_controller::committer::SubResource;
use d_controller::storage::MemoryStore;
use d_controller::Resource;
use d_controller::StoreError;
use d_controller::Workspace;
use d_controller::WorkspacePhase;

use crate::common::config;
use crate::common::mount_gvr;
use crate::common::mount_kind;
use crate::common::mount_object;
use crate::common::mounted_workspace;
use crate::common::wait_until;
use crate::common::TestContext;
use crate::common::WAIT;

/// The status commit survives a conflicting spec commit; the retry finds the
/// status converged and only writes the spec.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spec_conflict_keeps_status_and_retries_spec_only() {
    crate::enable_logger();
    let store = MemoryStore::new();
    store.add_kind(mount_kind());
    store
        .create(
            &Workspace::gvr(),
            &mounted_workspace("w1", "s1").with_phase(WorkspacePhase::Initializing),
        )
        .unwrap();
    let ctx = TestContext::start(store, config("spec-conflict"));

    assert!(wait_until(WAIT, || ctx.workspace("w1").status.phase == WorkspacePhase::Unavailable).await);
    ctx.settle("w1").await;
    let status_calls = ctx.store.patch_calls(SubResource::Status);
    let spec_calls = ctx.store.patch_calls(SubResource::Spec);

    ctx.store.inject_patch_failure(
        SubResource::Spec,
        StoreError::Conflict {
            key: "w1".to_string(),
            expected: "stale".to_string(),
        },
    );
    ctx.store
        .create(&mount_gvr(), &mount_object("s1", "Ready", "https://s1.example.io"))
        .unwrap();

    assert!(wait_until(WAIT, || ctx.workspace("w1").spec.url == "https://s1.example.io").await);
    ctx.settle("w1").await;

    let ws = ctx.workspace("w1");
    assert_eq!(ws.status.phase, WorkspacePhase::Ready);
    assert_eq!(ctx.store.patch_calls(SubResource::Status) - status_calls, 1);
    assert_eq!(ctx.store.patch_calls(SubResource::Spec) - spec_calls, 2);

    ctx.stop().await;
}

/// A converged workspace is never written again.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_converged_workspace_makes_no_writes() {
    let store = MemoryStore::new();
    store.add_kind(mount_kind());
    store
        .create(&mount_gvr(), &mount_object("s1", "Ready", "https://s1.example.io"))
        .unwrap();
    store
        .create(
            &Workspace::gvr(),
            &mounted_workspace("w1", "s1").with_phase(WorkspacePhase::Initializing),
        )
        .unwrap();
    let ctx = TestContext::start(store, config("converged"));

    assert!(wait_until(WAIT, || ctx.workspace("w1").spec.url == "https://s1.example.io").await);
    ctx.settle("w1").await;
    let version = ctx.workspace("w1").metadata.resource_version;
    let calls = ctx.store.patch_calls(SubResource::Status) + ctx.store.patch_calls(SubResource::Spec);

    ctx.runtime.queue().add(&crate::common::workspace_key("w1"));
    ctx.settle("w1").await;

    assert_eq!(ctx.workspace("w1").metadata.resource_version, version);
    assert_eq!(
        ctx.store.patch_calls(SubResource::Status) + ctx.store.patch_calls(SubResource::Spec),
        calls
    );

    ctx.stop().await;
}
