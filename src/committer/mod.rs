//! Optimistic, per-sub-resource commits of reconciled objects.
mod merge_patch;

pub use merge_patch::*;

#[cfg(test)]
mod committer_test;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tracing::debug;

use crate::ObjectRef;
use crate::Resource;
use crate::Result;

/// Independently versioned part of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubResource {
    Spec,
    Status,
}

impl SubResource {
    /// Top-level field holding the sub-resource
    pub fn field(&self) -> &'static str {
        match self {
            SubResource::Spec => "spec",
            SubResource::Status => "status",
        }
    }
}

impl fmt::Display for SubResource {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// Conditional write against the object store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PatchApplier: Send + Sync + 'static {
    /// Merges `patch` into the `sub_resource` of `target` if the object is
    /// still at `expected_version`.
    ///
    /// Returns the object's new resource version.
    ///
    /// # Errors
    /// `StoreError::Conflict` on a version mismatch, `StoreError::NotFound`
    /// when the object is gone.
    async fn apply_optimistic(
        &self,
        target: &ObjectRef,
        sub_resource: SubResource,
        expected_version: &str,
        patch: &Value,
    ) -> Result<String>;
}

/// Writes the difference between two snapshots of one sub-resource.
#[derive(Clone)]
pub struct Committer {
    applier: Arc<dyn PatchApplier>,
}

impl Committer {
    pub fn new(applier: Arc<dyn PatchApplier>) -> Self {
        Self { applier }
    }

    /// Commits `new`'s `sub_resource` if it differs from `old`'s.
    ///
    /// The write is conditioned on `new`'s resource version. Returns the
    /// resulting version, or `None` when nothing changed and the store was
    /// not contacted. Conflicts are returned, never retried here.
    pub async fn commit<R: Resource>(
        &self,
        sub_resource: SubResource,
        old: &R,
        new: &R,
    ) -> Result<Option<String>> {
        let (before, after) = match sub_resource {
            SubResource::Spec => (
                serde_json::to_value(old.spec())?,
                serde_json::to_value(new.spec())?,
            ),
            SubResource::Status => (
                serde_json::to_value(old.status())?,
                serde_json::to_value(new.status())?,
            ),
        };

        let Some(patch) = create_merge_patch(&before, &after) else {
            return Ok(None);
        };

        let target = ObjectRef::from_meta(R::gvr(), new.meta());
        let expected_version = new.resource_version();
        debug!(
            target = %target,
            sub_resource = %sub_resource,
            resource_version = expected_version,
            "committing patch: {}",
            patch
        );

        let version = self
            .applier
            .apply_optimistic(&target, sub_resource, expected_version, &patch)
            .await?;
        Ok(Some(version))
    }
}
