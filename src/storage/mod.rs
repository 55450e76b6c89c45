//! Object store backends.
mod memory_store;

#[doc(hidden)]
pub use memory_store::*;
