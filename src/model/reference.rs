//! Secondary object references and their normalized index identity.
//!
//! A primary object points at a secondary object through an
//! [`ObjectReference`]; a watch delivers the secondary object itself together
//! with its [`GroupVersionResource`]. [`ReferenceKey`] is the value both sides
//! reduce to, so the reverse index can be queried straight from a watch event.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::DynamicObject;
use super::GroupVersionResource;
use super::Object;
use crate::BuiltinApis;
use crate::ReconcileError;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// `group/version`, or bare `version` for the core group
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectReference {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.into(),
        }
    }

    /// `(group, version)` of the reference.
    pub fn group_version(&self) -> Result<(&str, &str)> {
        let gv = match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        };
        if gv.1.is_empty() || gv.1.contains('/') {
            return Err(ReconcileError::InvalidReference(format!(
                "invalid apiVersion {:?}",
                self.api_version
            ))
            .into());
        }
        Ok(gv)
    }

    /// Maps the reference to resource coordinates.
    ///
    /// Built-in kinds use the built-in table; anything else is the lowercase
    /// kind with an `s` suffix.
    pub fn resolve(
        &self,
        builtin: &BuiltinApis,
    ) -> Result<GroupVersionResource> {
        if self.kind.is_empty() || self.name.is_empty() {
            return Err(ReconcileError::InvalidReference(format!(
                "reference {self} must name a kind and an object"
            ))
            .into());
        }
        let (group, version) = self.group_version()?;
        let resource = builtin
            .resource_for_kind(group, &self.kind)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}s", self.kind.to_lowercase()));
        Ok(GroupVersionResource::new(group, version, resource))
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} {}/{}", self.api_version, self.kind, ns, self.name),
            None => write!(f, "{}/{} {}", self.api_version, self.kind, self.name),
        }
    }
}

/// Normalized identity of a secondary object, used as a reverse-index value.
///
/// The API version is not part of the identity: one object served under
/// several versions is still one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceKey {
    pub cluster: String,
    pub group: String,
    pub resource: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ReferenceKey {
    /// Identity of the object a primary object in `cluster` references.
    pub fn from_reference(
        cluster: &str,
        reference: &ObjectReference,
        builtin: &BuiltinApis,
    ) -> Result<Self> {
        let gvr = reference.resolve(builtin)?;
        Ok(Self {
            cluster: cluster.to_string(),
            group: gvr.group,
            resource: gvr.resource,
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
        })
    }

    /// Identity of a watched object delivered under `gvr`.
    pub fn from_object(
        gvr: &GroupVersionResource,
        obj: &DynamicObject,
    ) -> Self {
        let meta = obj.meta();
        Self {
            cluster: meta.cluster.clone(),
            group: gvr.group.clone(),
            resource: gvr.resource.clone(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
        }
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.cluster,
            self.group,
            self.resource,
            self.namespace.as_deref().unwrap_or_default(),
            self.name
        )
    }
}
