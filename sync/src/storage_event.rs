//! Cross-tab notifications carried by the shared storage itself.
//!
//! Writing the context cache entry *is* the notification, so `publish` does
//! nothing. Listeners watch the backend's change events for the context key
//! and decode the stored cache entry.

use async_trait::async_trait;
use context::CONTEXT_CACHE_KEY;
use pos_core::StampedContext;
use storage::{CacheStore, StorageEvents};
use tracing::{debug, trace};

use crate::channel::{ChannelListener, ContextChannel};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct StorageEventTransport {
    cache: CacheStore,
}

impl StorageEventTransport {
    pub fn new(cache: CacheStore) -> Self {
        Self { cache }
    }
}

impl ContextChannel for StorageEventTransport {
    fn name(&self) -> &'static str {
        "storage_event"
    }

    fn publish(&self, stamped: &StampedContext) -> Result<()> {
        trace!(%stamped, "Storage event transport relies on the cache write");
        Ok(())
    }

    fn listen(&self) -> Option<Box<dyn ChannelListener>> {
        let Some(events) = self.cache.backend().subscribe() else {
            debug!("Storage backend has no change notifications");
            return None;
        };

        Some(Box::new(StorageEventListener {
            key: self.cache.namespaced(CONTEXT_CACHE_KEY),
            cache: self.cache.clone(),
            events,
        }))
    }
}

struct StorageEventListener {
    key: String,
    cache: CacheStore,
    events: StorageEvents,
}

impl StorageEventListener {
    fn decode(&self, raw: &str) -> Option<StampedContext> {
        let Some(entry) = CacheStore::decode::<StampedContext>(raw) else {
            debug!(key = %self.key, "Dropping undecodable storage event");
            return None;
        };
        if entry.is_expired(self.cache.clock().now_millis()) {
            trace!(key = %self.key, "Ignoring expired context from storage event");
            return None;
        }
        entry.value.validated()
    }
}

#[async_trait]
impl ChannelListener for StorageEventListener {
    async fn recv(&mut self) -> Option<StampedContext> {
        loop {
            let event = self.events.recv().await?;
            if !event.concerns(&self.key) {
                continue;
            }

            let stamped = match (&event.key, &event.new_value) {
                (_, Some(raw)) => self.decode(raw),
                // A removal never clears another tab's context.
                (Some(_), None) => None,
                (None, None) => self
                    .cache
                    .get::<StampedContext>(CONTEXT_CACHE_KEY)
                    .and_then(StampedContext::validated),
            };

            if let Some(stamped) = stamped {
                return Some(stamped);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pos_core::{ManualClock, OperationalContext};
    use std::sync::Arc;
    use std::time::Duration;
    use storage::{DisabledStorage, MemoryStorage, StorageBackend};

    fn cache_on(storage: MemoryStorage, clock: Arc<ManualClock>) -> CacheStore {
        CacheStore::new(Arc::new(storage)).with_clock(clock)
    }

    #[tokio::test]
    async fn test_cache_write_in_other_tab_is_received() {
        let clock = Arc::new(ManualClock::new(1_000));
        let storage = MemoryStorage::new();
        let tab_a = cache_on(storage.clone(), clock.clone());
        let tab_b = StorageEventTransport::new(cache_on(storage.handle(), clock));
        let mut listener = tab_b.listen().unwrap();

        let stamped = StampedContext::new(OperationalContext::new("waiter", "north"), 1_000);
        tab_a.set(CONTEXT_CACHE_KEY, &stamped, Some(60));

        assert_eq!(listener.recv().await, Some(stamped));
    }

    #[tokio::test]
    async fn test_removal_and_foreign_keys_are_ignored() {
        let clock = Arc::new(ManualClock::new(1_000));
        let storage = MemoryStorage::new();
        let tab_a = cache_on(storage.clone(), clock.clone());
        let mut listener = StorageEventTransport::new(cache_on(storage.handle(), clock))
            .listen()
            .unwrap();

        tab_a.set("debug", &true, None);
        let stamped = StampedContext::new(OperationalContext::new("a", "b"), 1);
        tab_a.set(CONTEXT_CACHE_KEY, &stamped, None);
        assert!(listener.recv().await.is_some());

        tab_a.remove(CONTEXT_CACHE_KEY);
        storage.set_item("pos:operational-context", "garbage").unwrap();
        tab_a.set(CONTEXT_CACHE_KEY, &OperationalContext::new("unstamped", "b"), None);
        let next = tokio::time::timeout(Duration::from_millis(50), listener.recv()).await;
        assert!(next.is_err());
    }

    #[test]
    fn test_disabled_storage_cannot_listen() {
        let transport = StorageEventTransport::new(CacheStore::new(Arc::new(DisabledStorage)));
        assert!(transport.listen().is_none());
        assert!(
            transport
                .publish(&StampedContext::new(OperationalContext::new("a", "b"), 1))
                .is_ok()
        );
    }
}
