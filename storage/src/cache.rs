//! Namespaced key/value cache with per-entry expiry.
//!
//! The cache is best effort. Any backend failure (quota, disabled storage,
//! corrupt entries) is logged and swallowed: `get` reports a miss and `set`
//! becomes a no-op. Callers never see a storage error.

use crate::backend::StorageBackend;
use pos_core::{Clock, SystemClock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Default key prefix.
pub const DEFAULT_NAMESPACE: &str = "pos:";

/// What is actually stored under a namespaced key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub value: T,
    /// Epoch milliseconds.
    pub stored_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

impl<T> CacheEntry<T> {
    /// An entry without TTL never expires on time.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        match self.ttl_seconds {
            Some(ttl) => {
                let ttl_millis = i64::try_from(ttl.saturating_mul(1_000)).unwrap_or(i64::MAX);
                now_millis > self.stored_at.saturating_add(ttl_millis)
            }
            None => false,
        }
    }
}

/// Typed, namespaced cache on top of a [`StorageBackend`].
#[derive(Debug, Clone)]
pub struct CacheStore {
    backend: Arc<dyn StorageBackend>,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_namespace(backend, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(backend: Arc<dyn StorageBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock, e.g. with a `ManualClock` for simulated time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Full storage key for `key`.
    pub fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Fresh value stored under `key`. Expired or undecodable entries are
    /// removed and reported as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_entry(key).map(|entry| entry.value)
    }

    pub fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let full_key = self.namespaced(key);

        let raw = match self.backend.get_item(&full_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        let entry = match Self::decode::<T>(&raw) {
            Some(entry) => entry,
            None => {
                warn!(key = %full_key, "Discarding undecodable cache entry");
                self.remove(key);
                return None;
            }
        };

        if entry.is_expired(self.clock.now_millis()) {
            debug!(key = %full_key, "Cache entry expired");
            self.remove(key);
            return None;
        }

        trace!(key = %full_key, "Cache hit");
        Some(entry)
    }

    /// Decode a raw stored entry, e.g. one carried by a storage change event.
    pub fn decode<T: DeserializeOwned>(raw: &str) -> Option<CacheEntry<T>> {
        serde_json::from_str(raw).ok()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: Option<u64>) {
        let full_key = self.namespaced(key);
        let entry = CacheEntry {
            value,
            stored_at: self.clock.now_millis(),
            ttl_seconds,
        };

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Failed to encode cache entry");
                return;
            }
        };

        if let Err(e) = self.backend.set_item(&full_key, &raw) {
            warn!(key = %full_key, error = %e, "Cache write failed, continuing without cache");
        }
    }

    pub fn remove(&self, key: &str) {
        let full_key = self.namespaced(key);
        if let Err(e) = self.backend.remove_item(&full_key) {
            warn!(key = %full_key, error = %e, "Cache remove failed");
        }
    }

    /// Remove every entry whose key (inside the namespace) starts with
    /// `prefix`. Returns the number of removed entries.
    pub fn clear(&self, prefix: &str) -> usize {
        let full_prefix = self.namespaced(prefix);
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix = %full_prefix, error = %e, "Cache clear failed");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(&full_prefix)) {
            match self.backend.remove_item(key) {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %key, error = %e, "Cache remove failed"),
            }
        }
        debug!(prefix = %full_prefix, removed, "Cache cleared");
        removed
    }
}

/// Logout purge: remove every stored key except the `preserve` allow-list.
///
/// Returns the number of removed keys. Failures are logged, never returned.
pub fn purge_storage(backend: &dyn StorageBackend, preserve: &[String]) -> usize {
    let keys = match backend.keys() {
        Ok(keys) => keys,
        Err(e) => {
            warn!(error = %e, "Storage purge skipped");
            return 0;
        }
    };

    let mut removed = 0;
    for key in keys.iter().filter(|k| !preserve.contains(k)) {
        match backend.remove_item(key) {
            Ok(()) => removed += 1,
            Err(e) => warn!(key = %key, error = %e, "Failed to purge storage key"),
        }
    }
    debug!(removed, preserved = preserve.len(), "Storage purged");
    removed
}
