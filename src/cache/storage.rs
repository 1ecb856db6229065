//! Cache Storage Module
//!
//! The set of named cache stores, one per cache generation, with an optional
//! byte quota shared by every store. When opened on a directory, every change
//! is written through to disk and the stores are reloaded at the next start.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::store::ensure_get;
use crate::cache::{CacheDir, CacheStats, CacheStore, RequestKey, ResponseSnapshot};
use crate::error::{Result, ShellError};
use crate::generation::GenerationSet;

/// Cache storage shared between the fetch tasks and the lifecycle.
pub type SharedStorage = Arc<RwLock<CacheStorage>>;

// == Cache Storage ==
/// Named cache stores keyed by generation name.
#[derive(Debug, Default)]
pub struct CacheStorage {
    stores: HashMap<String, CacheStore>,
    /// Store names in creation order
    names: Vec<String>,
    /// Total byte quota across all stores, None = unlimited
    quota_bytes: Option<usize>,
    /// Write-through copy on disk, None = memory only
    disk: Option<CacheDir>,
    /// Generation pair recorded by the last activation
    active: Option<GenerationSet>,
}

impl CacheStorage {
    // == Constructors ==
    /// Creates an empty, memory-only storage.
    pub fn new(quota_bytes: Option<usize>) -> Self {
        Self {
            quota_bytes,
            ..Self::default()
        }
    }

    /// Opens the storage persisted under `root`, loading every store and the
    /// last activated generation pair.
    pub fn persistent(root: impl Into<PathBuf>, quota_bytes: Option<usize>) -> Result<Self> {
        let disk = CacheDir::open(root)?;
        let mut storage = Self::new(quota_bytes);

        for loaded in disk.load()? {
            storage.names.push(loaded.name.clone());
            let store = CacheStore::restore(loaded.name.clone(), loaded.entries);
            storage.stores.insert(loaded.name, store);
        }
        storage.active = disk.read_active()?;

        info!(
            "Loaded {} cache stores ({} bytes) from {}",
            storage.names.len(),
            storage.used_bytes(),
            disk.root().display()
        );
        storage.disk = Some(disk);
        Ok(storage)
    }

    /// Wraps a new memory-only storage for sharing across tasks.
    pub fn shared(quota_bytes: Option<usize>) -> SharedStorage {
        Self::new(quota_bytes).into_shared()
    }

    pub fn into_shared(self) -> SharedStorage {
        Arc::new(RwLock::new(self))
    }

    // == Open ==
    /// Returns the named store, creating it if missing.
    pub fn open(&mut self, name: &str) -> Result<&CacheStore> {
        self.open_mut(name).map(|store| &*store)
    }

    fn open_mut(&mut self, name: &str) -> Result<&mut CacheStore> {
        if !self.stores.contains_key(name) {
            if let Some(disk) = &self.disk {
                disk.create_store(name, Utc::now())?;
            }
            self.names.push(name.to_string());
        }
        Ok(self
            .stores
            .entry(name.to_string())
            .or_insert_with(|| CacheStore::new(name)))
    }

    pub fn get(&self, name: &str) -> Option<&CacheStore> {
        self.stores.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    // == Delete ==
    /// Tears down a whole store. Returns true if it existed.
    ///
    /// A store whose files cannot be removed is still dropped from memory;
    /// it reloads at the next start and the next activation purges it again.
    pub fn delete(&mut self, name: &str) -> bool {
        if self.stores.remove(name).is_none() {
            return false;
        }
        self.names.retain(|n| n != name);

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.delete_store(name) {
                warn!("Failed to remove persisted store {}: {}", name, e);
            }
        }
        true
    }

    /// Removes one entry from the named store. Returns true if it existed.
    pub fn delete_entry(&mut self, name: &str, key: &RequestKey) -> Result<bool> {
        let Some(store) = self.stores.get_mut(name) else {
            return Ok(false);
        };
        if let Some(disk) = &self.disk {
            disk.remove_entry(name, key)?;
        }
        Ok(store.delete(key))
    }

    // == Keys ==
    /// Returns all store names in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.names.clone()
    }

    // == Match ==
    /// Looks up `key` in the named store without creating the store.
    pub fn match_in(&self, name: &str, key: &RequestKey) -> Option<ResponseSnapshot> {
        self.stores.get(name).and_then(|store| store.get(key))
    }

    // == Put ==
    /// Writes one entry into the named store, creating the store if missing.
    /// Subject to the quota.
    pub fn put(&mut self, name: &str, key: RequestKey, response: ResponseSnapshot) -> Result<()> {
        ensure_get(&key)?;
        self.check_entry_quota(name, &key, &response)?;

        self.open_mut(name)?;
        self.write_through(name, key, response)
    }

    /// Writes one entry into a store that already exists. A missing store
    /// (never opened, or purged by an activation) is refused, never recreated.
    pub fn put_existing(&mut self, name: &str, key: RequestKey, response: ResponseSnapshot) -> Result<()> {
        ensure_get(&key)?;
        if !self.has(name) {
            return Err(ShellError::StoreNotFound(name.to_string()));
        }
        self.check_entry_quota(name, &key, &response)?;

        self.write_through(name, key, response)
    }

    // == Put All ==
    /// Writes a batch into the named store. On any error nothing is written
    /// and a missing store is not created.
    pub fn put_all(&mut self, name: &str, entries: Vec<(RequestKey, ResponseSnapshot)>) -> Result<()> {
        for (key, _) in &entries {
            ensure_get(key)?;
        }

        let (incoming, replaced) = entries.iter().fold((0, 0), |(incoming, replaced), (key, response)| {
            let existing = self.get(name).map_or(0, |store| store.entry_size(key));
            (incoming + response.size_bytes(), replaced + existing)
        });
        self.check_quota(incoming, replaced)?;

        let created = !self.has(name);
        self.open_mut(name)?;
        for (key, response) in entries {
            if let Err(e) = self.write_through(name, key, response) {
                // Only a disk failure gets here. A store created for this
                // batch is torn down again; entries already overwritten in an
                // existing store hold responses just as fresh as the old ones.
                if created {
                    self.delete(name);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    // == Active Generations ==
    /// Records the generation pair that just activated.
    pub fn record_active(&mut self, generations: &GenerationSet) -> Result<()> {
        self.active = Some(generations.clone());
        match &self.disk {
            Some(disk) => disk.write_active(generations),
            None => Ok(()),
        }
    }

    /// The generation pair recorded by the last activation, surviving restarts
    /// when the storage is persistent.
    pub fn active(&self) -> Option<&GenerationSet> {
        self.active.as_ref()
    }

    /// Per-store statistics in creation order.
    pub fn stats(&self) -> Vec<(String, CacheStats)> {
        self.names
            .iter()
            .filter_map(|name| self.stores.get(name).map(|store| (name.clone(), store.stats())))
            .collect()
    }

    /// Bytes currently held across all stores.
    pub fn used_bytes(&self) -> usize {
        self.stores.values().map(CacheStore::size_bytes).sum()
    }

    fn write_through(&mut self, name: &str, key: RequestKey, response: ResponseSnapshot) -> Result<()> {
        let store = self
            .stores
            .get_mut(name)
            .ok_or_else(|| ShellError::StoreNotFound(name.to_string()))?;

        if let Some(disk) = &self.disk {
            disk.write_entry(name, store.seq_for(&key), &key, &response)?;
        }
        store.put(key, response)
    }

    fn check_entry_quota(&self, name: &str, key: &RequestKey, response: &ResponseSnapshot) -> Result<()> {
        let replaced = self.get(name).map_or(0, |store| store.entry_size(key));

        self.check_quota(response.size_bytes(), replaced).inspect_err(|_| {
            if let Some(store) = self.stores.get(name) {
                store.record_rejected_write();
            }
        })
    }

    fn check_quota(&self, incoming: usize, replaced: usize) -> Result<()> {
        let Some(quota) = self.quota_bytes else {
            return Ok(());
        };

        let projected = (self.used_bytes() + incoming).saturating_sub(replaced);
        if projected > quota {
            return Err(ShellError::QuotaExceeded(format!(
                "{} bytes requested, quota is {} bytes",
                projected, quota
            )));
        }
        Ok(())
    }
}
