//! Fan-out of context changes to every configured transport, and the bridge
//! that wires a resolver to them.

use std::sync::Arc;

use config::BroadcastConfig;
use context::ContextResolver;
use pos_core::{ChangeOrigin, ContextChange, StampedContext};
use storage::CacheStore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::broadcast::ChannelHub;
use crate::channel::ContextChannel;
use crate::storage_event::StorageEventTransport;

/// Publishes to, and listens on, a set of [`ContextChannel`]s.
#[derive(Debug, Clone, Default)]
pub struct CrossTabBroadcaster {
    channels: Vec<Arc<dyn ContextChannel>>,
}

impl CrossTabBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Arc<dyn ContextChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Transports enabled in `config`: the hub topic and/or storage events
    /// on `cache`'s backend.
    pub fn from_config(config: &BroadcastConfig, hub: &ChannelHub, cache: &CacheStore) -> Self {
        let mut broadcaster = Self::new();
        if config.broadcast_channel {
            broadcaster = broadcaster.with_channel(Arc::new(hub.open(&config.topic)));
        }
        if config.storage_events {
            let transport = StorageEventTransport::new(cache.clone());
            broadcaster = broadcaster.with_channel(Arc::new(transport));
        }
        broadcaster
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Announce `stamped` on every channel. Invalid contexts are dropped.
    pub fn publish(&self, stamped: &StampedContext) {
        if !stamped.context.is_valid() {
            debug!(?stamped, "Not broadcasting invalid context");
            return;
        }
        for channel in &self.channels {
            if let Err(e) = channel.publish(stamped) {
                warn!(channel = channel.name(), error = %e, "Failed to broadcast context");
            }
        }
    }

    /// Call `handler` for every context received on any channel until the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(StampedContext) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let tasks = self
            .channels
            .iter()
            .filter_map(|channel| {
                let mut listener = channel.listen()?;
                let handler = Arc::clone(&handler);
                let name = channel.name();
                Some(tokio::spawn(async move {
                    while let Some(stamped) = listener.recv().await {
                        debug!(channel = name, %stamped, "Context received from another tab");
                        handler(stamped);
                    }
                    debug!(channel = name, "Channel listener finished");
                }))
            })
            .collect();

        Subscription { tasks }
    }

    /// Bridge `resolver` to the other tabs: its local changes are published,
    /// and contexts received from other tabs are adopted via
    /// [`ContextResolver::apply_remote`].
    pub fn attach(&self, resolver: &ContextResolver) -> BridgeHandle {
        let incoming = self.subscribe({
            let resolver = resolver.clone();
            move |stamped| {
                resolver.apply_remote(stamped);
            }
        });

        let outgoing = tokio::spawn(forward_local_changes(self.clone(), resolver.subscribe()));

        BridgeHandle { incoming, outgoing }
    }
}

async fn forward_local_changes(
    broadcaster: CrossTabBroadcaster,
    mut changes: broadcast::Receiver<ContextChange>,
) {
    loop {
        match changes.recv().await {
            Ok(change) if change.origin == ChangeOrigin::Local => {
                // Clears never leave the tab.
                if let Some(stamped) = change.stamped() {
                    broadcaster.publish(&stamped);
                }
            }
            // Remote adoptions are not re-broadcast.
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Context change feed lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Active listeners. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub fn listener_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Resolver-to-broadcaster wiring. Dropping it detaches the resolver.
#[derive(Debug)]
pub struct BridgeHandle {
    incoming: Subscription,
    outgoing: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn listener_count(&self) -> usize {
        self.incoming.listener_count()
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.outgoing.abort();
    }
}
