//! Object model shared by the cache, the routers and the reconcile driver.
mod dynamic;
mod key;
mod meta;
mod reference;
mod workspace;

pub use dynamic::*;
pub use key::*;
pub use meta::*;
pub use reference::*;
pub use workspace::*;
