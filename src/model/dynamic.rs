use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use super::GroupVersionResource;
use super::Object;
use super::ObjectMeta;

/// An object of a kind only known at runtime.
///
/// Everything except the metadata stays untyped JSON (`spec`, `status`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicObject {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl DynamicObject {
    pub fn new(
        gvr: &GroupVersionResource,
        kind: impl Into<String>,
        metadata: ObjectMeta,
    ) -> Self {
        Self {
            api_version: gvr.api_version(),
            kind: kind.into(),
            metadata,
            content: Map::new(),
        }
    }

    pub fn with_field(
        mut self,
        name: &str,
        value: Value,
    ) -> Self {
        self.content.insert(name.to_string(), value);
        self
    }

    /// Follows a path of object fields, e.g. `["status", "phase"]`.
    pub fn field(
        &self,
        path: &[&str],
    ) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.content.get(*first)?, |value, segment| value.get(segment))
    }

    pub fn str_field(
        &self,
        path: &[&str],
    ) -> Option<&str> {
        self.field(path).and_then(Value::as_str)
    }
}

impl Object for DynamicObject {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
