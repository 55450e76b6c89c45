use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::Error;
use crate::Object;
use crate::ReconcileError;
use crate::Result;

/// Computes the index values of one object.
pub type IndexFunc<T> = Arc<dyn Fn(&T) -> Result<Vec<String>> + Send + Sync>;

/// `index value -> object keys`
type Index = HashMap<String, HashSet<String>>;

/// What `Indexer::replace` changed.
#[derive(Debug)]
pub struct ReplaceDiff<T> {
    pub added: Vec<Arc<T>>,
    /// `(old, new)` pairs
    pub updated: Vec<(Arc<T>, Arc<T>)>,
    pub removed: Vec<Arc<T>>,
}

struct Inner<T> {
    items: HashMap<String, Arc<T>>,
    indexers: HashMap<String, IndexFunc<T>>,
    indices: HashMap<String, Index>,
}

/// Thread-safe object cache keyed by [`ObjectKey`] text, with secondary
/// indexes maintained in the same critical section as every mutation.
///
/// [`ObjectKey`]: crate::ObjectKey
pub struct Indexer<T: Object> {
    inner: RwLock<Inner<T>>,
}

impl<T: Object> Default for Indexer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Object> Indexer<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                items: HashMap::new(),
                indexers: HashMap::new(),
                indices: HashMap::new(),
            }),
        }
    }

    /// Registers a named index and builds it over the objects already cached.
    pub fn add_indexer(
        &self,
        name: &str,
        func: IndexFunc<T>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.indexers.contains_key(name) {
            return Err(Error::Fatal(format!("indexer {name} already registered")));
        }

        let mut index = Index::new();
        for (key, obj) in &inner.items {
            for value in index_values(name, &func, obj) {
                index.entry(value).or_default().insert(key.clone());
            }
        }
        inner.indices.insert(name.to_string(), index);
        inner.indexers.insert(name.to_string(), func);
        Ok(())
    }

    /// Inserts or replaces an object, returning the previous version.
    pub fn upsert(
        &self,
        obj: impl Into<Arc<T>>,
    ) -> Option<Arc<T>> {
        let obj = obj.into();
        let key = obj.key().to_string();
        let mut inner = self.inner.write();
        let old = inner.items.insert(key.clone(), obj.clone());
        inner.update_indices(&key, old.as_deref(), Some(obj.as_ref()));
        old
    }

    pub fn delete(
        &self,
        key: &str,
    ) -> Option<Arc<T>> {
        let mut inner = self.inner.write();
        let old = inner.items.remove(key)?;
        inner.update_indices(key, Some(old.as_ref()), None);
        Some(old)
    }

    /// Swaps the whole content for `items` and reports the difference.
    pub fn replace(
        &self,
        items: Vec<T>,
    ) -> ReplaceDiff<T> {
        let mut diff = ReplaceDiff {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        };

        let mut inner = self.inner.write();
        let mut stale: HashSet<String> = inner.items.keys().cloned().collect();
        for obj in items {
            let key = obj.key().to_string();
            stale.remove(&key);
            let obj = Arc::new(obj);
            let old = inner.items.insert(key.clone(), obj.clone());
            inner.update_indices(&key, old.as_deref(), Some(obj.as_ref()));
            match old {
                Some(old) => diff.updated.push((old, obj)),
                None => diff.added.push(obj),
            }
        }
        for key in stale {
            if let Some(old) = inner.items.remove(&key) {
                inner.update_indices(&key, Some(old.as_ref()), None);
                diff.removed.push(old);
            }
        }
        diff
    }

    pub fn get_by_key(
        &self,
        key: &str,
    ) -> Option<Arc<T>> {
        self.inner.read().items.get(key).cloned()
    }

    pub fn list(&self) -> Vec<Arc<T>> {
        self.inner.read().items.values().cloned().collect()
    }

    pub fn list_keys(&self) -> Vec<String> {
        self.inner.read().items.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of the objects whose index `name` contains `value`.
    pub fn index_keys(
        &self,
        name: &str,
        value: &str,
    ) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let index = inner
            .indices
            .get(name)
            .ok_or_else(|| ReconcileError::MissingIndex(name.to_string()))?;
        Ok(index
            .get(value)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Objects whose index `name` contains `value`.
    pub fn by_index(
        &self,
        name: &str,
        value: &str,
    ) -> Result<Vec<Arc<T>>> {
        let inner = self.inner.read();
        let index = inner
            .indices
            .get(name)
            .ok_or_else(|| ReconcileError::MissingIndex(name.to_string()))?;
        Ok(index
            .get(value)
            .into_iter()
            .flatten()
            .filter_map(|key| inner.items.get(key).cloned())
            .collect())
    }
}

impl<T: Object> Inner<T> {
    fn update_indices(
        &mut self,
        key: &str,
        old: Option<&T>,
        new: Option<&T>,
    ) {
        for (name, func) in &self.indexers {
            let Some(index) = self.indices.get_mut(name) else {
                continue;
            };
            if let Some(old) = old {
                for value in index_values(name, func, old) {
                    if let Some(keys) = index.get_mut(&value) {
                        keys.remove(key);
                        if keys.is_empty() {
                            index.remove(&value);
                        }
                    }
                }
            }
            if let Some(new) = new {
                for value in index_values(name, func, new) {
                    index.entry(value).or_default().insert(key.to_string());
                }
            }
        }
    }
}

fn index_values<T: Object>(
    name: &str,
    func: &IndexFunc<T>,
    obj: &T,
) -> Vec<String> {
    match func(obj) {
        Ok(values) => values,
        Err(e) => {
            warn!(index = name, key = %obj.key(), "index function failed: {}", e);
            Vec::new()
        }
    }
}
