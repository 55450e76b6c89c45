//! Pluggable reconciliation policy.
mod mounts;

pub use mounts::*;


use async_trait::async_trait;

use crate::Resource;
use crate::Result;

/// Result of one reconcile phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Proceed; the object may have been mutated
    Continue,
    /// A dependency is not ready: abort the pass without committing and
    /// requeue the key without backoff
    StopAndRequeue,
}

/// Business policy driving a primary object toward its desired state.
///
/// Each phase may mutate only its own sub-resource of `obj`. Status runs
/// first and is committed before spec runs.
#[async_trait]
pub trait Reconciler<R: Resource>: Send + Sync + 'static {
    async fn reconcile_status(
        &self,
        obj: &mut R,
    ) -> Result<ReconcileOutcome>;

    async fn reconcile_spec(
        &self,
        obj: &mut R,
    ) -> Result<ReconcileOutcome>;
}
