//! Worker pool and reconcile driver.
mod builder;
mod worker;

pub use builder::*;
pub use worker::*;
