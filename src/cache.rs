//! Enrichment cache.
//!
//! Keys are derived from the user's email, the current profile content and
//! the job id, so editing a profile silently moves lookups to fresh keys.
//! Stale entries are never deleted, only orphaned.

use std::{collections::HashMap, fmt, sync::RwLock};

use crate::{
    fingerprint::fingerprint,
    profiles::Profile,
    storage::{BackendLocal, StorageManager},
};

/// Cache key for one (user, profile version, job) triple:
/// `user:{H(email)}:profile:{H(profile text)}:job:{job_id}:enriched`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(profile: &Profile, job_id: &str) -> Self {
        CacheKey(format!(
            "user:{}:profile:{}:job:{}:enriched",
            fingerprint(&profile.email),
            fingerprint(&profile.profile_text()),
            job_id
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cached value is not utf8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("cache lock poisoned: {0}")]
    Poisoned(String),
}

/// Flat key/value store. No TTL, no locking across calls: concurrent
/// writers to the same key resolve as last-writer-wins.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    /// Overwrites unconditionally.
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| CacheError::Poisoned(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CacheError::Poisoned(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key. Keys contain `:` and arbitrary job ids, so the file
/// name is the key's fingerprint.
pub struct FileCache<S: StorageManager = BackendLocal> {
    storage: S,
}

impl<S: StorageManager> FileCache<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    fn file_name(key: &str) -> String {
        format!("{}.json", fingerprint(key))
    }
}

impl<S: StorageManager> CacheStore for FileCache<S> {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.storage.read(&Self::file_name(key))? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.storage.write(&Self::file_name(key), value.as_bytes())?;
        Ok(())
    }
}
