use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::ReconcileError;

const CLUSTER_SEPARATOR: char = '|';
const NAMESPACE_SEPARATOR: char = '/';

/// Identity of an object across tenants: `(cluster, namespace?, name)`.
///
/// The text form is the work-queue key: `cluster|namespace/name`, or
/// `cluster|name` for cluster-scoped objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub cluster: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        cluster: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.into(),
        }
    }

    pub fn cluster_scoped(
        cluster: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(cluster, None, name)
    }

    /// Splits a queue key back into its parts.
    ///
    /// # Errors
    /// Returns [`ReconcileError::MalformedKey`] when the key cannot have been
    /// produced by [`ObjectKey`]'s `Display`.
    pub fn parse(key: &str) -> crate::Result<Self> {
        let malformed = || Error::from(ReconcileError::MalformedKey(key.to_string()));

        let (cluster, rest) = key.split_once(CLUSTER_SEPARATOR).ok_or_else(malformed)?;
        if cluster.is_empty() || rest.contains(CLUSTER_SEPARATOR) {
            return Err(malformed());
        }

        let mut parts = rest.split(NAMESPACE_SEPARATOR);
        let key = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) if !name.is_empty() => Self::cluster_scoped(cluster, name),
            (Some(ns), Some(name), None) if !ns.is_empty() && !name.is_empty() => {
                Self::new(cluster, Some(ns), name)
            }
            _ => return Err(malformed()),
        };
        Ok(key)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(
                f,
                "{}{CLUSTER_SEPARATOR}{}{NAMESPACE_SEPARATOR}{}",
                self.cluster, ns, self.name
            ),
            None => write!(f, "{}{CLUSTER_SEPARATOR}{}", self.cluster, self.name),
        }
    }
}

impl FromStr for ObjectKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
