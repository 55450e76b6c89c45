use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::GroupVersionResource;
use super::Object;
use super::ObjectMeta;
use super::ObjectReference;
use super::Resource;

pub const TENANCY_GROUP: &str = "tenancy.kcp.io";
pub const TENANCY_VERSION: &str = "v1alpha1";

/// Condition type reporting whether the mount object backs the workspace
pub const WORKSPACE_MOUNT_READY: &str = "WorkspaceMountReady";
pub const REASON_MOUNT_OBJECT_NOT_FOUND: &str = "MountObjectNotFound";
pub const REASON_MOUNT_NOT_READY: &str = "MountNotReady";

/// The primary kind reconciled by the workspace-mounts controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkspaceSpec,
    #[serde(default)]
    pub status: WorkspaceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    /// Address the workspace is served under
    #[serde(default, rename = "URL", skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount: Option<Mount>,
}

/// Points the workspace at an external object that serves it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mount {
    pub reference: ObjectReference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceStatus {
    #[serde(default)]
    pub phase: WorkspacePhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkspacePhase {
    #[default]
    Scheduling,
    Initializing,
    Ready,
    Unavailable,
}

impl fmt::Display for WorkspacePhase {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WorkspaceStatus {
    pub fn condition(
        &self,
        type_: &str,
    ) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Sets a condition, replacing an existing one of the same type in place.
    pub fn set_condition(
        &mut self,
        condition: Condition,
    ) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }

    pub fn mark_true(
        &mut self,
        type_: &str,
    ) {
        self.set_condition(Condition {
            type_: type_.to_string(),
            status: ConditionStatus::True,
            reason: None,
            message: None,
        });
    }

    pub fn mark_false(
        &mut self,
        type_: &str,
        reason: &str,
        message: impl Into<String>,
    ) {
        self.set_condition(Condition {
            type_: type_.to_string(),
            status: ConditionStatus::False,
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        });
    }
}

impl Workspace {
    pub fn new(meta: ObjectMeta) -> Self {
        Self {
            metadata: meta,
            ..Default::default()
        }
    }

    pub fn with_mount(
        mut self,
        reference: ObjectReference,
    ) -> Self {
        self.spec.mount = Some(Mount { reference });
        self
    }

    pub fn with_phase(
        mut self,
        phase: WorkspacePhase,
    ) -> Self {
        self.status.phase = phase;
        self
    }
}

impl Object for Workspace {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Resource for Workspace {
    type Spec = WorkspaceSpec;
    type Status = WorkspaceStatus;

    fn gvr() -> GroupVersionResource {
        GroupVersionResource::new(TENANCY_GROUP, TENANCY_VERSION, "workspaces")
    }

    fn spec(&self) -> &WorkspaceSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut WorkspaceSpec {
        &mut self.spec
    }

    fn status(&self) -> &WorkspaceStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut WorkspaceStatus {
        &mut self.status
    }
}
