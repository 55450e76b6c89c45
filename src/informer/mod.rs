//! List+Watch reflector that mirrors one resource into an [`Indexer`] and
//! fans its changes out to event handlers.
//!
//! [`Indexer`]: crate::cache::Indexer
mod shared_informer;

pub use shared_informer::*;


use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;

/// One change reported by a watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
    /// Progress marker carrying only a resource version
    Bookmark(String),
}

/// A consistent snapshot of a resource.
#[derive(Debug, Clone)]
pub struct ObjectList<T> {
    pub items: Vec<T>,
    /// Version to start watching from
    pub resource_version: String,
}

pub type WatchStream<T> = BoxStream<'static, Result<WatchEvent<T>>>;

/// List/Watch protocol of one resource.
///
/// A watch started from a version older than the retained history fails
/// with `WatchError::Expired`, either immediately or as a stream item.
#[async_trait]
pub trait ListerWatcher<T: Send + 'static>: Send + Sync + 'static {
    async fn list(&self) -> Result<ObjectList<T>>;

    async fn watch(
        &self,
        resource_version: &str,
    ) -> Result<WatchStream<T>>;
}

/// A delete notification.
#[derive(Debug, Clone)]
pub enum DeletedObject<T> {
    /// Reported by the watch stream
    Confirmed(Arc<T>),
    /// Inferred after a relist no longer contained the object; carries the
    /// last cached state
    FinalStateUnknown { key: String, obj: Arc<T> },
}

impl<T> DeletedObject<T> {
    /// Last known state, whether or not the delete was observed directly.
    pub fn object(&self) -> &Arc<T> {
        match self {
            DeletedObject::Confirmed(obj) => obj,
            DeletedObject::FinalStateUnknown { obj, .. } => obj,
        }
    }

    pub fn is_final_state_unknown(&self) -> bool {
        matches!(self, DeletedObject::FinalStateUnknown { .. })
    }
}

/// Receives cache changes of one resource.
///
/// Called on the informer's delivery path; implementations must not block.
pub trait ResourceEventHandler<T>: Send + Sync {
    fn on_add(
        &self,
        obj: &Arc<T>,
    );

    fn on_update(
        &self,
        old: &Arc<T>,
        new: &Arc<T>,
    );

    fn on_delete(
        &self,
        obj: &DeletedObject<T>,
    );
}
