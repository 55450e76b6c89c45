//! JSON Merge Patch (RFC 7396) construction.

use serde_json::Map;
use serde_json::Value;

/// Builds the merge patch that turns `before` into `after`.
///
/// Returns `None` when the documents are equal. Fields removed from an
/// object become `null`; any non-object change replaces the value whole.
pub fn create_merge_patch(
    before: &Value,
    after: &Value,
) -> Option<Value> {
    if before == after {
        return None;
    }

    match (before, after) {
        (Value::Object(before), Value::Object(after)) => {
            let mut patch = Map::new();
            for (field, old) in before {
                match after.get(field) {
                    None => {
                        patch.insert(field.clone(), Value::Null);
                    }
                    Some(new) => {
                        if let Some(diff) = create_merge_patch(old, new) {
                            patch.insert(field.clone(), diff);
                        }
                    }
                }
            }
            for (field, new) in after {
                if !before.contains_key(field) {
                    patch.insert(field.clone(), new.clone());
                }
            }
            Some(Value::Object(patch))
        }
        _ => Some(after.clone()),
    }
}
