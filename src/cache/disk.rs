//! Disk Persistence Module
//!
//! Write-through copy of the cache storage, reloaded at startup so cache
//! generations outlive the process.
//!
//! Layout under the cache directory:
//! ```text
//! active.json                          last activated generation pair
//! <sha256(store)>/store.json           store name and creation time
//! <sha256(store)>/<sha256(key)>.json   entry metadata
//! <sha256(store)>/<sha256(key)>.body   entry body
//! ```
//! Every file is written to a temporary name and renamed into place, and a
//! body always lands before its metadata, so a crash never leaves an entry
//! whose metadata points at a missing or partial body.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use crate::cache::{RequestKey, ResponseSnapshot};
use crate::error::{Result, ShellError};
use crate::generation::GenerationSet;

const STORE_FILE: &str = "store.json";
const ACTIVE_FILE: &str = "active.json";

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStore {
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    method: String,
    url: String,
    seq: u64,
    status: u16,
    headers: Vec<(String, String)>,
    final_url: Option<String>,
    stored_at: DateTime<Utc>,
}

/// A store read back from disk.
#[derive(Debug)]
pub struct LoadedStore {
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Entries with their insertion sequence, in no particular order
    pub entries: Vec<(u64, RequestKey, ResponseSnapshot)>,
}

// == Cache Dir ==
/// Root directory holding the persisted stores.
#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    /// Opens (and creates if needed) the cache directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| storage_error(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // == Stores ==
    pub fn create_store(&self, name: &str, created_at: DateTime<Utc>) -> Result<()> {
        let dir = self.store_dir(name);
        fs::create_dir_all(&dir).map_err(|e| storage_error(&dir, e))?;
        write_json(
            &dir.join(STORE_FILE),
            &PersistedStore {
                name: name.to_string(),
                created_at,
            },
        )
    }

    /// Removes a store and every entry in it. A missing store is not an error.
    pub fn delete_store(&self, name: &str) -> Result<()> {
        let dir = self.store_dir(name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(&dir, e)),
        }
    }

    // == Entries ==
    pub fn write_entry(
        &self,
        store: &str,
        seq: u64,
        key: &RequestKey,
        response: &ResponseSnapshot,
    ) -> Result<()> {
        let (meta_path, body_path) = self.entry_paths(store, key);
        write_atomic(&body_path, &response.body)?;
        write_json(
            &meta_path,
            &PersistedEntry {
                method: key.method().to_string(),
                url: key.url().to_string(),
                seq,
                status: response.status.as_u16(),
                headers: headers_to_vec(&response.headers),
                final_url: response.url.as_ref().map(|url| url.to_string()),
                stored_at: response.stored_at,
            },
        )
    }

    pub fn remove_entry(&self, store: &str, key: &RequestKey) -> Result<()> {
        let (meta_path, body_path) = self.entry_paths(store, key);
        for path in [meta_path, body_path] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(storage_error(&path, e)),
            }
        }
        Ok(())
    }

    // == Active Generations ==
    pub fn write_active(&self, generations: &GenerationSet) -> Result<()> {
        write_json(&self.root.join(ACTIVE_FILE), generations)
    }

    /// The generation pair recorded at the last activation, if any.
    pub fn read_active(&self) -> Result<Option<GenerationSet>> {
        let path = self.root.join(ACTIVE_FILE);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| storage_error(&path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(&path, e)),
        }
    }

    // == Load ==
    /// Reads every persisted store, oldest first. Entries whose metadata or
    /// body cannot be read are skipped with a warning.
    pub fn load(&self) -> Result<Vec<LoadedStore>> {
        let mut stores = Vec::new();
        let dir_entries = fs::read_dir(&self.root).map_err(|e| storage_error(&self.root, e))?;

        for dir_entry in dir_entries {
            let dir = dir_entry.map_err(|e| storage_error(&self.root, e))?.path();
            if !dir.is_dir() {
                continue;
            }
            let meta: PersistedStore = match read_json(&dir.join(STORE_FILE)) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Skipping unreadable cache store at {}: {}", dir.display(), e);
                    continue;
                }
            };
            let entries = load_entries(&dir)?;
            debug!("Loaded {} entries for store {}", entries.len(), meta.name);

            stores.push(LoadedStore {
                name: meta.name,
                created_at: meta.created_at,
                entries,
            });
        }

        stores.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(stores)
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        self.root.join(digest(name))
    }

    fn entry_paths(&self, store: &str, key: &RequestKey) -> (PathBuf, PathBuf) {
        let dir = self.store_dir(store);
        let stem = digest(&key.to_string());
        (
            dir.join(format!("{}.json", stem)),
            dir.join(format!("{}.body", stem)),
        )
    }
}

fn load_entries(dir: &Path) -> Result<Vec<(u64, RequestKey, ResponseSnapshot)>> {
    let mut entries = Vec::new();
    for file in fs::read_dir(dir).map_err(|e| storage_error(dir, e))? {
        let path = file.map_err(|e| storage_error(dir, e))?.path();
        let is_entry = path.extension().is_some_and(|ext| ext == "json")
            && path.file_name().is_some_and(|name| name != STORE_FILE);
        if !is_entry {
            continue;
        }

        match load_entry(&path) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping unreadable cache entry {}: {}", path.display(), e),
        }
    }
    Ok(entries)
}

fn load_entry(meta_path: &Path) -> Result<(u64, RequestKey, ResponseSnapshot)> {
    let meta: PersistedEntry = read_json(meta_path)?;
    let body_path = meta_path.with_extension("body");
    let body = fs::read(&body_path).map_err(|e| storage_error(&body_path, e))?;

    let invalid = |what: &str| ShellError::Storage(format!("{}: invalid {}", meta_path.display(), what));
    let method = Method::from_bytes(meta.method.as_bytes()).map_err(|_| invalid("method"))?;
    let url = Url::parse(&meta.url).map_err(|_| invalid("url"))?;
    let status = StatusCode::from_u16(meta.status).map_err(|_| invalid("status"))?;
    let final_url = match meta.final_url {
        Some(raw) => Some(Url::parse(&raw).map_err(|_| invalid("final url"))?),
        None => None,
    };

    let response = ResponseSnapshot {
        status,
        headers: headers_from_vec(&meta.headers),
        body: body.into(),
        url: final_url,
        stored_at: meta.stored_at,
    };
    Ok((meta.seq, RequestKey::new(&method, &url), response))
}

fn headers_to_vec(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn headers_from_vec(items: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in items {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers
}

fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| storage_error(path, e))?;
    write_atomic(path, &bytes)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| storage_error(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| storage_error(path, e))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| storage_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| storage_error(path, e))
}

fn storage_error(path: &Path, e: impl std::fmt::Display) -> ShellError {
    ShellError::Storage(format!("{}: {}", path.display(), e))
}
