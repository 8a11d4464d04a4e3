//! Key/value storage backend abstraction.
//!
//! Mirrors the browser `localStorage` contract: synchronous string get/set,
//! plus change notifications that are delivered to every *other* writer of
//! the same underlying store.

use errors::StorageError;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// A change to the shared store.
///
/// `key == None` means "something changed, re-read" (e.g. a file watcher that
/// cannot tell which key was touched).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: Option<String>,
    pub new_value: Option<String>,
    /// Handle that caused the change, if known.
    pub origin: Option<Uuid>,
}

impl StorageEvent {
    pub fn changed(key: impl Into<String>, new_value: Option<String>, origin: Uuid) -> Self {
        Self {
            key: Some(key.into()),
            new_value,
            origin: Some(origin),
        }
    }

    pub fn unknown() -> Self {
        Self {
            key: None,
            new_value: None,
            origin: None,
        }
    }

    /// True when this event may concern `key`.
    pub fn concerns(&self, key: &str) -> bool {
        self.key.as_deref().is_none_or(|k| k == key)
    }
}

/// Change notifications for one subscriber.
///
/// Events written by the subscriber's own handle are skipped.
#[derive(Debug)]
pub struct StorageEvents {
    rx: broadcast::Receiver<StorageEvent>,
    own_origin: Option<Uuid>,
}

impl StorageEvents {
    pub fn new(rx: broadcast::Receiver<StorageEvent>, own_origin: Option<Uuid>) -> Self {
        Self { rx, own_origin }
    }

    /// Next foreign change, or `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.own_origin.is_some() && event.origin == self.own_origin {
                        continue;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Storage event subscriber lagged");
                    // Receivers re-read on any event, so a key-less one
                    // covers whatever was skipped.
                    return Some(StorageEvent::unknown());
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Synchronous key/value storage.
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Change notifications from other writers. `None` when the backend
    /// cannot observe foreign writes.
    fn subscribe(&self) -> Option<StorageEvents> {
        None
    }
}

/// Storage that is switched off (private mode, blocked by policy...).
/// Every operation fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStorage;

impl DisabledStorage {
    fn unavailable() -> StorageError {
        StorageError::Unavailable {
            reason: "storage is disabled".to_string(),
        }
    }
}

impl StorageBackend for DisabledStorage {
    fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(Self::unavailable())
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(Self::unavailable())
    }

    fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
        Err(Self::unavailable())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Err(Self::unavailable())
    }
}
