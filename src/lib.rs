//! A level-triggered reconciliation engine for multi-tenant control planes.
//!
//! Primary objects are mirrored by an [`informer::Informer`] into an
//! [`cache::Indexer`]; every kind reported by discovery gets its own watch in
//! the [`dynamic::DynamicWatchRegistry`]. The [`router::EventRouter`] turns
//! both event streams into keys on a rate-limited [`queue::WorkQueue`], and
//! [`controller::Controller`] workers reconcile each key in two phases,
//! committing status and then spec as optimistic merge patches.
mod config;
mod errors;
mod model;

pub mod cache;
pub mod committer;
pub mod controller;
pub mod dynamic;
pub mod informer;
pub mod metrics;
pub mod queue;
pub mod reconciler;
pub mod router;
pub mod storage;
pub mod utils;

pub use config::*;
pub use errors::*;
pub use model::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
