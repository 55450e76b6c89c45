//! Watches over resource kinds that are only known at runtime.
//!
//! ```text
//! Discovery feed:
//!   subscribe         -> watch exactly the current kinds
//!   Appeared(kind)    -> start one informer per kind
//!   Disappeared(kind) -> stop that informer
//!                                  ↓
//! Per-kind informer events -> GvrDispatch(kind) -> every GvrEventHandler
//! ```
mod registry;

pub use registry::*;


use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;

use crate::informer::DeletedObject;
use crate::informer::ListerWatcher;
use crate::DiscoveredKind;
use crate::DynamicObject;
use crate::GroupVersionResource;
use crate::ObjectKey;
use crate::Result;

/// Change in the set of servable resource kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Appeared(DiscoveredKind),
    Disappeared(GroupVersionResource),
}

/// The kinds servable when the subscription was taken, followed by every
/// change after that point.
///
/// An `Err` item means changes were lost. The stream is then useless and the
/// subscriber must subscribe again to get a fresh `current` set.
pub struct DiscoverySubscription {
    pub current: Vec<DiscoveredKind>,
    pub changes: BoxStream<'static, Result<DiscoveryEvent>>,
}

#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    async fn subscribe(&self) -> Result<DiscoverySubscription>;
}

/// Untyped access to any resource.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DynamicClient: Send + Sync + 'static {
    fn resource(
        &self,
        gvr: &GroupVersionResource,
    ) -> Arc<dyn ListerWatcher<DynamicObject>>;

    /// # Errors
    /// `StoreError::NotFound` when no such object exists.
    async fn get(
        &self,
        gvr: &GroupVersionResource,
        key: &ObjectKey,
    ) -> Result<DynamicObject>;
}

/// Receives events of every dynamically watched kind.
pub trait GvrEventHandler: Send + Sync {
    fn on_add(
        &self,
        gvr: &GroupVersionResource,
        obj: &Arc<DynamicObject>,
    );

    fn on_update(
        &self,
        gvr: &GroupVersionResource,
        old: &Arc<DynamicObject>,
        new: &Arc<DynamicObject>,
    );

    fn on_delete(
        &self,
        gvr: &GroupVersionResource,
        obj: &DeletedObject<DynamicObject>,
    );
}
