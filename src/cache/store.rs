//! Cache Store Module
//!
//! A single named key→response mapping. Writes are full overwrites, so the
//! last writer for a key wins.

use std::collections::HashMap;

use crate::cache::{CacheStats, RequestKey, ResponseSnapshot, StoreCounters};
use crate::error::{Result, ShellError};

#[derive(Debug)]
struct Slot {
    response: ResponseSnapshot,
    /// Insertion sequence of the key; kept across overwrites
    seq: u64,
}

// == Cache Store ==
/// One named cache store (one cache generation).
#[derive(Debug)]
pub struct CacheStore {
    /// Generation name
    name: String,
    /// Key-response storage
    entries: HashMap<RequestKey, Slot>,
    /// Sequence given to the next new key
    next_seq: u64,
    /// Lookup and write statistics
    counters: StoreCounters,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store with the given generation name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
            next_seq: 0,
            counters: StoreCounters::new(),
        }
    }

    /// Rebuilds a store from entries loaded off disk, keeping their sequence
    /// numbers. Restoring does not count as writes.
    pub fn restore(name: impl Into<String>, entries: Vec<(u64, RequestKey, ResponseSnapshot)>) -> Self {
        let mut store = Self::new(name);
        for (seq, key, response) in entries {
            store.next_seq = store.next_seq.max(seq + 1);
            store.entries.insert(key, Slot { response, seq });
        }
        store
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // == Get ==
    /// Looks up the response stored for `key`, recording a hit or miss.
    pub fn get(&self, key: &RequestKey) -> Option<ResponseSnapshot> {
        match self.entries.get(key) {
            Some(slot) => {
                self.counters.record_hit();
                Some(slot.response.clone())
            }
            None => {
                self.counters.record_miss();
                None
            }
        }
    }

    /// Returns true if an entry exists for `key`, without touching stats.
    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the footprint of the entry stored for `key`, or 0.
    pub fn entry_size(&self, key: &RequestKey) -> usize {
        self.entries
            .get(key)
            .map_or(0, |slot| slot.response.size_bytes())
    }

    /// Sequence number `key` has, or will get when first written.
    pub fn seq_for(&self, key: &RequestKey) -> u64 {
        self.entries.get(key).map_or(self.next_seq, |slot| slot.seq)
    }

    // == Put ==
    /// Stores a response, replacing any previous entry for the same key.
    ///
    /// Only GET requests may be stored.
    pub fn put(&mut self, key: RequestKey, response: ResponseSnapshot) -> Result<()> {
        ensure_get(&key)?;

        let seq = self.seq_for(&key);
        if seq == self.next_seq {
            self.next_seq += 1;
        }
        self.entries.insert(key, Slot { response, seq });
        self.counters.record_write();
        Ok(())
    }

    // == Delete ==
    /// Removes an entry. Returns true if it existed.
    pub fn delete(&mut self, key: &RequestKey) -> bool {
        self.entries.remove(key).is_some()
    }

    // == Keys ==
    /// Returns all keys in insertion order.
    pub fn keys(&self) -> Vec<RequestKey> {
        let mut keys: Vec<(&RequestKey, u64)> =
            self.entries.iter().map(|(key, slot)| (key, slot.seq)).collect();
        keys.sort_by_key(|(_, seq)| *seq);
        keys.into_iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn record_rejected_write(&self) {
        self.counters.record_rejected_write();
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len())
    }

    /// Total footprint of all entries in bytes.
    pub fn size_bytes(&self) -> usize {
        self.entries
            .values()
            .map(|slot| slot.response.size_bytes())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rejects keys of requests that may never be cached.
pub(crate) fn ensure_get(key: &RequestKey) -> Result<()> {
    if key.is_get() {
        Ok(())
    } else {
        Err(ShellError::InvalidRequest(format!(
            "Only GET requests can be cached, got {}",
            key
        )))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method, StatusCode};
    use url::Url;

    fn url(path: &str) -> Url {
        Url::parse("http://localhost:3000").unwrap().join(path).unwrap()
    }

    fn response(body: &'static str) -> ResponseSnapshot {
        ResponseSnapshot::new(StatusCode::OK, HeaderMap::new(), body, url("/"))
    }

    #[test]
    fn test_store_new() {
        let store = CacheStore::new("jobtracker-v1");
        assert_eq!(store.name(), "jobtracker-v1");
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_put_and_get() {
        let mut store = CacheStore::new("dynamic");
        let key = RequestKey::get(&url("/app.js"));

        store.put(key.clone(), response("console.log(1)")).unwrap();
        let cached = store.get(&key).unwrap();

        assert_eq!(cached.body, "console.log(1)");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_missing_records_miss() {
        let store = CacheStore::new("dynamic");

        assert!(store.get(&RequestKey::get(&url("/missing"))).is_none());
        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_store_overwrite_last_writer_wins() {
        let mut store = CacheStore::new("dynamic");
        let key = RequestKey::get(&url("/jobs"));

        store.put(key.clone(), response("first")).unwrap();
        store.put(key.clone(), response("second")).unwrap();

        assert_eq!(store.get(&key).unwrap().body, "second");
        assert_eq!(store.len(), 1);
        assert_eq!(store.keys(), vec![key]);
        assert_eq!(store.stats().writes, 2);
    }

    #[test]
    fn test_store_rejects_non_get() {
        let mut store = CacheStore::new("dynamic");
        let key = RequestKey::new(&Method::POST, &url("/jobs"));

        let result = store.put(key, response("created"));
        assert!(matches!(result, Err(ShellError::InvalidRequest(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_keys_in_insertion_order() {
        let mut store = CacheStore::new("static");
        let paths = ["/", "/index.html", "/manifest.json"];
        for path in paths {
            store.put(RequestKey::get(&url(path)), response("x")).unwrap();
        }

        let keys: Vec<String> = store.keys().iter().map(|k| k.url().to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "http://localhost:3000/",
                "http://localhost:3000/index.html",
                "http://localhost:3000/manifest.json",
            ]
        );
    }

    #[test]
    fn test_store_delete() {
        let mut store = CacheStore::new("dynamic");
        let key = RequestKey::get(&url("/app.css"));

        store.put(key.clone(), response("body{}")).unwrap();
        assert!(store.delete(&key));
        assert!(!store.delete(&key));
        assert!(store.is_empty());
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_store_seq_survives_delete() {
        let mut store = CacheStore::new("dynamic");
        let a = RequestKey::get(&url("/a"));
        let b = RequestKey::get(&url("/b"));
        let c = RequestKey::get(&url("/c"));
        store.put(a.clone(), response("a")).unwrap();
        store.put(b.clone(), response("b")).unwrap();

        store.delete(&a);
        store.put(c.clone(), response("c")).unwrap();

        assert_eq!(store.seq_for(&b), 1);
        assert_eq!(store.seq_for(&c), 2);
        assert_eq!(store.keys(), vec![b, c]);
    }

    #[test]
    fn test_store_restore_keeps_order_without_counting_writes() {
        let a = RequestKey::get(&url("/a"));
        let b = RequestKey::get(&url("/b"));
        let store = CacheStore::restore(
            "static",
            vec![(4, b.clone(), response("b")), (1, a.clone(), response("a"))],
        );

        assert_eq!(store.keys(), vec![a, b]);
        assert_eq!(store.stats().writes, 0);
        assert_eq!(store.seq_for(&RequestKey::get(&url("/new"))), 5);
    }
}
