//! Expiring key-value store interface used as the arbitration medium.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Errors surfaced by a store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store backend error: {0}")]
    Backend(#[from] Box<dyn StdError + Send + Sync>),
}

/// Key-value backend with expiring entries.
///
/// Each call must be atomic on its own; no compare-and-swap is required.
pub trait Store: Send + Sync {
    /// Value under `key`, or an empty string when absent or expired.
    fn get(&self, key: &str) -> Result<String, StoreError>;

    /// Overwrite `key` unconditionally, expiring after `ttl_seconds`.
    /// A TTL of zero never expires.
    fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StoreError>;

    /// Remove `key`. Absent keys are not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get(&self, key: &str) -> Result<String, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StoreError> {
        (**self).set(key, value, ttl_seconds)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process store backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, ready to hand to a guard configuration.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Number of live entries.
    pub fn len(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        Ok(self.lock()?.values().filter(|e| e.is_live(now)).count())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok(before - entries.len())
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<String, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                Ok(String::new())
            }
            None => Ok(String::new()),
        }
    }

    fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StoreError> {
        let expires_at = match ttl_seconds {
            0 => None,
            secs => Instant::now().checked_add(Duration::from_secs(secs)),
        };
        let mut entries = self.lock()?;
        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
