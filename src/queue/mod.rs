//! Rate-limited, deduplicating work queue of object keys.
mod rate_limiter;
mod work_queue;

pub use rate_limiter::*;
pub use work_queue::*;
