//! Workspace mounts: a workspace may be served by an external object (its
//! mount), referenced from `spec.mount.reference`. The workspace status
//! mirrors the mount object's readiness, and the workspace URL follows the
//! URL the mount object publishes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use super::ReconcileOutcome;
use super::Reconciler;
use crate::cache::IndexFunc;
use crate::committer::PatchApplier;
use crate::controller::ControllerBuilder;
use crate::dynamic::Discovery;
use crate::dynamic::DynamicClient;
use crate::informer::ListerWatcher;
use crate::BuiltinApis;
use crate::ControllerConfig;
use crate::DynamicObject;
use crate::ObjectKey;
use crate::ReferenceKey;
use crate::Result;
use crate::Workspace;
use crate::WorkspacePhase;
use crate::REASON_MOUNT_NOT_READY;
use crate::REASON_MOUNT_OBJECT_NOT_FOUND;
use crate::WORKSPACE_MOUNT_READY;

/// Reverse index from a mount object's [`ReferenceKey`] to the workspaces
/// mounting it
pub const WORKSPACE_MOUNTS_REFERENCE_INDEX: &str = "workspaceMountsReference";

/// Phase a mount object reports once it serves traffic
const MOUNT_PHASE_READY: &str = "Ready";

pub fn workspace_mount_index(builtin: Arc<BuiltinApis>) -> IndexFunc<Workspace> {
    Arc::new(move |ws: &Workspace| -> Result<Vec<String>> {
        let Some(mount) = &ws.spec.mount else {
            return Ok(Vec::new());
        };
        let key = ReferenceKey::from_reference(&ws.metadata.cluster, &mount.reference, &builtin)?;
        Ok(vec![key.to_string()])
    })
}

pub struct WorkspaceMountReconciler {
    client: Arc<dyn DynamicClient>,
    builtin: Arc<BuiltinApis>,
}

impl WorkspaceMountReconciler {
    pub fn new(
        client: Arc<dyn DynamicClient>,
        builtin: Arc<BuiltinApis>,
    ) -> Self {
        Self { client, builtin }
    }

    /// Fetches the mount object; `None` when the workspace has no mount or
    /// the object does not exist.
    async fn mount_object(
        &self,
        ws: &Workspace,
    ) -> Result<Option<DynamicObject>> {
        let Some(mount) = &ws.spec.mount else {
            return Ok(None);
        };
        let gvr = mount.reference.resolve(&self.builtin)?;
        let key = ObjectKey::new(
            ws.metadata.cluster.clone(),
            mount.reference.namespace.as_deref(),
            mount.reference.name.clone(),
        );
        match self.client.get(&gvr, &key).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Reconciler<Workspace> for WorkspaceMountReconciler {
    async fn reconcile_status(
        &self,
        ws: &mut Workspace,
    ) -> Result<ReconcileOutcome> {
        if ws.spec.mount.is_none() {
            return Ok(ReconcileOutcome::Continue);
        }

        let Some(obj) = self.mount_object(ws).await? else {
            ws.status.mark_false(
                WORKSPACE_MOUNT_READY,
                REASON_MOUNT_OBJECT_NOT_FOUND,
                "mount object not found",
            );
            ws.status.phase = WorkspacePhase::Unavailable;
            return Ok(ReconcileOutcome::Continue);
        };

        let Some(phase) = obj.str_field(&["status", "phase"]) else {
            debug!(key = %ws.metadata.key(), mount = %obj.metadata.key(), "mount object has no phase yet");
            return Ok(ReconcileOutcome::StopAndRequeue);
        };

        if phase == MOUNT_PHASE_READY {
            ws.status.mark_true(WORKSPACE_MOUNT_READY);
            if matches!(
                ws.status.phase,
                WorkspacePhase::Unavailable | WorkspacePhase::Ready | WorkspacePhase::Initializing
            ) {
                ws.status.phase = WorkspacePhase::Ready;
            }
        } else {
            ws.status.mark_false(
                WORKSPACE_MOUNT_READY,
                REASON_MOUNT_NOT_READY,
                format!("mount is not ready, phase {phase}"),
            );
            ws.status.phase = WorkspacePhase::Unavailable;
        }
        Ok(ReconcileOutcome::Continue)
    }

    async fn reconcile_spec(
        &self,
        ws: &mut Workspace,
    ) -> Result<ReconcileOutcome> {
        let Some(obj) = self.mount_object(ws).await? else {
            return Ok(ReconcileOutcome::Continue);
        };

        if obj.str_field(&["status", "phase"]) == Some(MOUNT_PHASE_READY) {
            match obj.str_field(&["status", "URL"]) {
                Some(url) if !url.is_empty() => ws.spec.url = url.to_string(),
                _ => {}
            }
        }
        Ok(ReconcileOutcome::Continue)
    }
}

/// Wires the workspace mounts controller: workspaces as the primary kind,
/// every discovered kind as a potential mount object.
pub fn workspace_mounts_controller(
    config: ControllerConfig,
    shutdown_signal: watch::Receiver<()>,
    workspaces: Arc<dyn ListerWatcher<Workspace>>,
    client: Arc<dyn DynamicClient>,
    discovery: Arc<dyn Discovery>,
    patch_applier: Arc<dyn PatchApplier>,
) -> ControllerBuilder<Workspace> {
    let builtin = Arc::new(config.builtin.clone());
    ControllerBuilder::new(config, shutdown_signal)
        .primary(workspaces)
        .reconciler(Arc::new(WorkspaceMountReconciler::new(
            client.clone(),
            builtin.clone(),
        )))
        .patch_applier(patch_applier)
        .index(WORKSPACE_MOUNTS_REFERENCE_INDEX, workspace_mount_index(builtin))
        .secondary(client, discovery, WORKSPACE_MOUNTS_REFERENCE_INDEX)
}
