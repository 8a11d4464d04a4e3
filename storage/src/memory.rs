use crate::backend::{StorageBackend, StorageEvent, StorageEvents};
use dashmap::DashMap;
use errors::StorageError;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug)]
struct Shared {
    items: DashMap<String, String>,
    events: broadcast::Sender<StorageEvent>,
    quota_bytes: Option<usize>,
}

/// In-process store shared by several sessions.
///
/// Each handle (see [`MemoryStorage::handle`]) behaves like one browser tab
/// looking at the same origin's storage: writes are visible to every handle,
/// but change events only reach the *other* handles.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    shared: Arc<Shared>,
    origin: Uuid,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A store that refuses writes once the total size of keys and values
    /// would exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self::build(Some(quota_bytes))
    }

    fn build(quota_bytes: Option<usize>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                items: DashMap::new(),
                events,
                quota_bytes,
            }),
            origin: Uuid::new_v4(),
        }
    }

    /// Another view of the same store with its own origin id.
    pub fn handle(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            origin: Uuid::new_v4(),
        }
    }

    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.shared.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.items.is_empty()
    }

    fn used_bytes_without(&self, key: &str) -> usize {
        self.shared
            .items
            .iter()
            .filter(|entry| entry.key() != key)
            .map(|entry| entry.key().len() + entry.value().len())
            .sum()
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        // No receivers is fine.
        let _ = self
            .shared
            .events
            .send(StorageEvent::changed(key, new_value, self.origin));
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.shared.items.get(key).map(|v| v.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.shared.quota_bytes {
            if self.used_bytes_without(key) + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }

        let previous = self
            .shared
            .items
            .insert(key.to_string(), value.to_string());

        if previous.as_deref() != Some(value) {
            trace!(key, "Storage item changed");
            self.notify(key, Some(value.to_string()));
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        if self.shared.items.remove(key).is_some() {
            trace!(key, "Storage item removed");
            self.notify(key, None);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .shared
            .items
            .iter()
            .map(|entry| entry.key().clone())
            .collect())
    }

    fn subscribe(&self) -> Option<StorageEvents> {
        Some(StorageEvents::new(
            self.shared.events.subscribe(),
            Some(self.origin),
        ))
    }
}
