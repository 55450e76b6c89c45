use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::ObjectMeta;
use crate::ObjectReference;
use crate::StoreError;
use crate::Workspace;
use crate::WorkspacePhase;
use crate::WORKSPACE_MOUNT_READY;

fn workspace() -> Workspace {
    let mut meta = ObjectMeta::new("root:org", None, "ws1");
    meta.uid = "uid-1".to_string();
    meta.resource_version = "7".to_string();
    Workspace::new(meta)
        .with_mount(ObjectReference::new("mounts.example.io/v1alpha1", "KubeCluster", None, "proxy"))
        .with_phase(WorkspacePhase::Initializing)
}

#[test]
fn test_merge_patch_of_equal_documents_is_none() {
    let doc = json!({"a": 1, "b": {"c": [1, 2]}});
    assert_eq!(create_merge_patch(&doc, &doc.clone()), None);
}

#[test]
fn test_merge_patch_contains_only_changes() {
    let before = json!({"phase": "Initializing", "keep": 1, "gone": true, "nested": {"x": 1, "y": 2}});
    let after = json!({"phase": "Ready", "keep": 1, "nested": {"x": 1, "y": 3}, "added": "v"});

    let patch = create_merge_patch(&before, &after).unwrap();
    assert_eq!(
        patch,
        json!({"phase": "Ready", "gone": null, "nested": {"y": 3}, "added": "v"})
    );

    let mut patched = before.clone();
    json_patch::merge(&mut patched, &patch);
    assert_eq!(patched, after);
}

#[test]
fn test_merge_patch_replaces_arrays_whole() {
    let before = json!({"conditions": [{"type": "A"}]});
    let after = json!({"conditions": [{"type": "A"}, {"type": "B"}]});

    let patch = create_merge_patch(&before, &after).unwrap();
    assert_eq!(patch, after);
}

#[tokio::test]
async fn test_commit_without_diff_makes_no_store_call() {
    let mut applier = MockPatchApplier::new();
    applier.expect_apply_optimistic().never();
    let committer = Committer::new(Arc::new(applier));

    let ws = workspace();
    for sub in [SubResource::Spec, SubResource::Status] {
        assert_eq!(committer.commit(sub, &ws, &ws.clone()).await.unwrap(), None);
    }
}

#[tokio::test]
async fn test_commit_status_sends_status_diff_only() {
    let old = workspace();
    let mut new = old.clone();
    new.status.phase = WorkspacePhase::Ready;
    new.status.mark_true(WORKSPACE_MOUNT_READY);
    // A spec change must not leak into a status commit.
    new.spec.url = "https://proxy".to_string();

    let mut applier = MockPatchApplier::new();
    applier
        .expect_apply_optimistic()
        .withf(|target, sub, expected, patch| {
            target.key.to_string() == "root:org|ws1"
                && target.uid == "uid-1"
                && *sub == SubResource::Status
                && expected == "7"
                && *patch
                    == json!({
                        "phase": "Ready",
                        "conditions": [{"type": "WorkspaceMountReady", "status": "True"}]
                    })
        })
        .times(1)
        .returning(|_, _, _, _| Ok("8".to_string()));
    let committer = Committer::new(Arc::new(applier));

    let version = committer
        .commit(SubResource::Status, &old, &new)
        .await
        .unwrap();
    assert_eq!(version.as_deref(), Some("8"));
}

#[tokio::test]
async fn test_commit_uses_working_copy_version() {
    let old = workspace();
    let mut new = old.clone();
    new.metadata.resource_version = "8".to_string();
    new.spec.url = "https://proxy".to_string();

    let mut applier = MockPatchApplier::new();
    applier
        .expect_apply_optimistic()
        .withf(|_, sub, expected, patch| {
            *sub == SubResource::Spec && expected == "8" && *patch == json!({"URL": "https://proxy"})
        })
        .times(1)
        .returning(|_, _, _, _| Ok("9".to_string()));
    let committer = Committer::new(Arc::new(applier));

    let version = committer.commit(SubResource::Spec, &old, &new).await.unwrap();
    assert_eq!(version.as_deref(), Some("9"));
}

#[tokio::test]
async fn test_commit_surfaces_conflict_without_retry() {
    let old = workspace();
    let mut new = old.clone();
    new.spec.url = "https://proxy".to_string();

    let mut applier = MockPatchApplier::new();
    applier
        .expect_apply_optimistic()
        .times(1)
        .returning(|target, _, expected, _| {
            Err(StoreError::Conflict {
                key: target.key.to_string(),
                expected: expected.to_string(),
            }
            .into())
        });
    let committer = Committer::new(Arc::new(applier));

    let err = committer
        .commit(SubResource::Spec, &old, &new)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(err.is_retryable());
}
