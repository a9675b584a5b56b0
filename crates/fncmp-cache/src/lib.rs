//! # fncmp-cache
//!
//! A process-memory cache organised as namespaces ("stores", usually one per
//! connection) of keyed entries. Each entry:
//!
//! - holds one value whose type is fixed by its first write; reading or
//!   writing another type fails with [`CacheError::WrongType`]
//! - expires `ttl` after its last write, at which point its on-timeout hook
//!   runs and the entry is removed
//! - keeps a bounded history of past values
//!
//! All entries of a [`StoreManager`] share one expiry scheduler task driven
//! by a deadline-ordered queue.

#![deny(unsafe_code)]

mod entry;
pub mod errors;
mod expiry;
mod handle;
mod store;

pub use entry::EntryInfo;
pub use errors::{CacheError, Result};
pub use handle::Cache;
pub use store::{HookKind, StoreManager};
