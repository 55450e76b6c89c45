//! Local mirror of watched objects with transactional secondary indexes.
mod indexer;

pub use indexer::*;
