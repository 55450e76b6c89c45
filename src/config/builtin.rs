//! Built-in API metadata.
//!
//! The table is pure data: it is built once at startup and then shared
//! read-only (behind `Arc` or `&`) with the components that map kinds to
//! resources or filter discovered kinds.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::Result;
use crate::StoreError;

use super::invalid;

/// One built-in API served by every logical cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinApi {
    pub group: &'static str,
    pub version: &'static str,
    /// Plural resource name, e.g. `configmaps`
    pub resource: &'static str,
    pub singular: &'static str,
    pub kind: &'static str,
    pub namespaced: bool,
    pub has_status: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupResource {
    group: String,
    resource: String,
}

/// Immutable lookup table over [`BuiltinApi`] entries
#[derive(Debug, Clone)]
pub struct BuiltinApis {
    apis: Vec<BuiltinApi>,
    by_resource: HashMap<GroupResource, usize>,
    by_kind: HashMap<(String, String), usize>,
}

impl Default for BuiltinApis {
    fn default() -> Self {
        Self::new(default_builtin_apis())
    }
}

impl BuiltinApis {
    pub fn new(apis: Vec<BuiltinApi>) -> Self {
        let mut by_resource = HashMap::with_capacity(apis.len());
        let mut by_kind = HashMap::with_capacity(apis.len());
        for (i, api) in apis.iter().enumerate() {
            by_resource
                .entry(GroupResource {
                    group: api.group.to_string(),
                    resource: api.resource.to_string(),
                })
                .or_insert(i);
            by_kind
                .entry((api.group.to_string(), api.kind.to_string()))
                .or_insert(i);
        }
        Self {
            apis,
            by_resource,
            by_kind,
        }
    }

    /// Indicates whether the API identified by group and resource is built-in.
    pub fn is_builtin(
        &self,
        group: &str,
        resource: &str,
    ) -> bool {
        self.lookup(group, resource).is_some()
    }

    /// Retrieves the metadata of a built-in API.
    pub fn get(
        &self,
        group: &str,
        resource: &str,
    ) -> Result<&BuiltinApi> {
        self.lookup(group, resource).ok_or_else(|| {
            StoreError::NotFound {
                key: format!("no schema found for built-in API {resource}.{group}"),
            }
            .into()
        })
    }

    /// Plural resource name for a built-in kind, if the kind is built-in.
    pub fn resource_for_kind(
        &self,
        group: &str,
        kind: &str,
    ) -> Option<&'static str> {
        self.by_kind
            .get(&(group.to_string(), kind.to_string()))
            .and_then(|i| self.apis.get(*i))
            .map(|api| api.resource)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuiltinApi> {
        self.apis.iter()
    }

    pub fn len(&self) -> usize {
        self.apis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for api in &self.apis {
            if api.resource.is_empty() || api.kind.is_empty() || api.version.is_empty() {
                return Err(invalid(format!(
                    "built-in API {:?} must name a version, resource and kind",
                    api
                )));
            }
            if !seen.insert((api.group, api.version, api.resource)) {
                return Err(invalid(format!(
                    "duplicate built-in API {}/{}.{}",
                    api.version, api.resource, api.group
                )));
            }
        }
        Ok(())
    }

    fn lookup(
        &self,
        group: &str,
        resource: &str,
    ) -> Option<&BuiltinApi> {
        self.by_resource
            .get(&GroupResource {
                group: group.to_string(),
                resource: resource.to_string(),
            })
            .and_then(|i| self.apis.get(*i))
    }
}

const fn api(
    group: &'static str,
    resource: &'static str,
    singular: &'static str,
    kind: &'static str,
    namespaced: bool,
    has_status: bool,
) -> BuiltinApi {
    BuiltinApi {
        group,
        version: "v1",
        resource,
        singular,
        kind,
        namespaced,
        has_status,
    }
}

/// APIs available in every logical cluster without an export.
pub fn default_builtin_apis() -> Vec<BuiltinApi> {
    const RBAC: &str = "rbac.authorization.k8s.io";
    const ADMISSION: &str = "admissionregistration.k8s.io";
    vec![
        api("", "namespaces", "namespace", "Namespace", false, true),
        api("", "configmaps", "configmap", "ConfigMap", true, false),
        api("", "events", "event", "Event", true, false),
        api("", "resourcequotas", "resourcequota", "ResourceQuota", true, true),
        api("", "secrets", "secret", "Secret", true, false),
        api("", "serviceaccounts", "serviceaccount", "ServiceAccount", true, false),
        api(RBAC, "clusterroles", "clusterrole", "ClusterRole", false, false),
        api(
            RBAC,
            "clusterrolebindings",
            "clusterrolebinding",
            "ClusterRoleBinding",
            false,
            false,
        ),
        api(RBAC, "roles", "role", "Role", true, false),
        api(RBAC, "rolebindings", "rolebinding", "RoleBinding", true, false),
        api(
            "certificates.k8s.io",
            "certificatesigningrequests",
            "certificatesigningrequest",
            "CertificateSigningRequest",
            false,
            true,
        ),
        api("coordination.k8s.io", "leases", "lease", "Lease", true, false),
        api(
            ADMISSION,
            "mutatingwebhookconfigurations",
            "mutatingwebhookconfiguration",
            "MutatingWebhookConfiguration",
            false,
            false,
        ),
        api(
            ADMISSION,
            "validatingwebhookconfigurations",
            "validatingwebhookconfiguration",
            "ValidatingWebhookConfiguration",
            false,
            false,
        ),
        api("events.k8s.io", "events", "event", "Event", true, false),
        api(
            ADMISSION,
            "validatingadmissionpolicies",
            "validatingadmissionpolicy",
            "ValidatingAdmissionPolicy",
            false,
            true,
        ),
        api(
            ADMISSION,
            "validatingadmissionpolicybindings",
            "validatingadmissionpolicybinding",
            "ValidatingAdmissionPolicyBinding",
            false,
            false,
        ),
        api(
            "apiextensions.k8s.io",
            "customresourcedefinitions",
            "customresourcedefinition",
            "CustomResourceDefinition",
            false,
            true,
        ),
    ]
}
