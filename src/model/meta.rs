use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use super::ObjectKey;

/// Identity and versioning metadata common to every stored object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Logical cluster (tenant scope) the object lives in
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default)]
    pub uid: String,
    /// Opaque version assigned by the store on every write
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub generation: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(
        cluster: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.cluster.clone(), self.namespace.as_deref(), self.name.clone())
    }
}

/// Anything the caches and watch streams can hold.
pub trait Object: Clone + Debug + Send + Sync + 'static {
    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }

    fn resource_version(&self) -> &str {
        &self.meta().resource_version
    }
}

/// A primary object type with independently versioned `spec` and `status`
/// sub-resources.
pub trait Resource: Object + Serialize + DeserializeOwned {
    type Spec: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;
    type Status: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    /// Resource coordinates under which the store serves this type.
    fn gvr() -> GroupVersionResource;

    fn spec(&self) -> &Self::Spec;

    fn spec_mut(&mut self) -> &mut Self::Spec;

    fn status(&self) -> &Self::Status;

    fn status_mut(&mut self) -> &mut Self::Status;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// `group/version`, or bare `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.version, self.resource)
        } else {
            write!(f, "{}.{}.{}", self.version, self.resource, self.group)
        }
    }
}

/// A resource kind reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveredKind {
    pub gvr: GroupVersionResource,
    pub kind: String,
    pub namespaced: bool,
}

/// Target of a conditional write: which object, under which resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub gvr: GroupVersionResource,
    pub key: ObjectKey,
    pub uid: String,
}

impl ObjectRef {
    pub fn from_meta(
        gvr: GroupVersionResource,
        meta: &ObjectMeta,
    ) -> Self {
        Self {
            gvr,
            key: meta.key(),
            uid: meta.uid.clone(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{} {}", self.gvr, self.key)
    }
}
