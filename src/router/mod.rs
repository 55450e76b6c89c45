//! Turns watch notifications into work-queue keys.
//!
//! Routing never reconciles: every callback ends in `WorkQueue::add`.
#[cfg(test)]
mod router_test;

use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::cache::Indexer;
use crate::dynamic::GvrEventHandler;
use crate::informer::DeletedObject;
use crate::informer::ResourceEventHandler;
use crate::queue::WorkQueue;
use crate::DynamicObject;
use crate::GroupVersionResource;
use crate::Object;
use crate::ReferenceKey;

/// Routes primary object events straight to their own key, and secondary
/// object events to the keys of every primary object whose reverse index
/// entry names them.
pub struct EventRouter<R: Object> {
    controller: String,
    queue: Arc<WorkQueue>,
    indexer: Arc<Indexer<R>>,
    index_name: String,
}

impl<R: Object> EventRouter<R> {
    pub fn new(
        controller: impl Into<String>,
        queue: Arc<WorkQueue>,
        indexer: Arc<Indexer<R>>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            controller: controller.into(),
            queue,
            indexer,
            index_name: index_name.into(),
        }
    }

    fn enqueue(
        &self,
        key: &str,
    ) {
        debug!(controller = %self.controller, key, "enqueue");
        self.queue.add(key);
    }

    fn enqueue_referencing(
        &self,
        gvr: &GroupVersionResource,
        obj: &DynamicObject,
    ) {
        let value = ReferenceKey::from_object(gvr, obj).to_string();
        match self.indexer.index_keys(&self.index_name, &value) {
            Ok(keys) => {
                if keys.is_empty() {
                    trace!(controller = %self.controller, %gvr, reference = %value, "no referencing objects");
                }
                for key in keys {
                    debug!(
                        controller = %self.controller,
                        key = %key,
                        %gvr,
                        reference = %value,
                        "enqueue referencing object"
                    );
                    self.queue.add(&key);
                }
            }
            Err(e) => {
                error!(controller = %self.controller, %gvr, reference = %value, "index lookup failed: {}", e);
            }
        }
    }
}

impl<R: Object> ResourceEventHandler<R> for EventRouter<R> {
    fn on_add(
        &self,
        obj: &Arc<R>,
    ) {
        self.enqueue(&obj.key().to_string());
    }

    fn on_update(
        &self,
        _old: &Arc<R>,
        new: &Arc<R>,
    ) {
        self.enqueue(&new.key().to_string());
    }

    fn on_delete(
        &self,
        obj: &DeletedObject<R>,
    ) {
        // A key of a deleted object drains out of the queue on its own.
        trace!(controller = %self.controller, key = %obj.object().key(), "primary object deleted");
    }
}

impl<R: Object> GvrEventHandler for EventRouter<R> {
    fn on_add(
        &self,
        gvr: &GroupVersionResource,
        obj: &Arc<DynamicObject>,
    ) {
        self.enqueue_referencing(gvr, obj);
    }

    fn on_update(
        &self,
        gvr: &GroupVersionResource,
        old: &Arc<DynamicObject>,
        new: &Arc<DynamicObject>,
    ) {
        if old.resource_version() == new.resource_version() {
            trace!(controller = %self.controller, %gvr, key = %new.key(), "skipping resync");
            return;
        }
        self.enqueue_referencing(gvr, new);
    }

    fn on_delete(
        &self,
        gvr: &GroupVersionResource,
        obj: &DeletedObject<DynamicObject>,
    ) {
        self.enqueue_referencing(gvr, obj.object());
    }
}
