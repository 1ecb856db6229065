//! Cache Module
//!
//! Named, generation-scoped stores of HTTP response snapshots keyed by
//! request identity, optionally persisted to a directory.

mod disk;
mod entry;
mod key;
mod stats;
mod storage;
mod store;


// Re-export public types
pub use disk::{CacheDir, LoadedStore};
pub use entry::{ResponseSnapshot, OFFLINE_BODY};
pub use key::RequestKey;
pub use stats::{CacheStats, StoreCounters};
pub use storage::{CacheStorage, SharedStorage};
pub use store::CacheStore;
