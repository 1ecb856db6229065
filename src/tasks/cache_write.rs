//! Background Cache Write Task
//!
//! Stores a network response in a cache generation as a detached task.

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{RequestKey, ResponseSnapshot, SharedStorage};
use crate::generation::CacheGeneration;

/// Spawns a detached write of `response` under `key` into `generation`.
///
/// The foreground response never waits on this task. A failed write (quota
/// exceeded, rejected key, generation purged since the fetch started) is
/// logged and dropped. The write never creates a store. Dropping or aborting
/// the request that spawned it does not cancel the write.
///
/// # Returns
/// The JoinHandle of the write. Callers are free to ignore it.
pub fn spawn_cache_write(
    storage: SharedStorage,
    generation: CacheGeneration,
    key: RequestKey,
    response: ResponseSnapshot,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = {
            let mut storage = storage.write().await;
            storage.put_existing(generation.as_str(), key.clone(), response)
        };

        match result {
            Ok(()) => debug!("Cached {} in {}", key, generation),
            Err(e) => warn!("Dropped cache write for {} in {}: {}", key, generation, e),
        }
    })
}
