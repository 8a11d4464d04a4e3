//! One terminal session (a browser tab): resolver, guard and cross-tab
//! bridge assembled from configuration.

use std::sync::Arc;

use config::PosConfig;
use context::{ContextResolver, Guard, GuardHandle, GuardOptions, GuardState, ResolverOptions};
use errors::ResolutionError;
use pos_core::{Clock, ContextGateway, OperationalContext, Resolution, SystemClock};
use storage::{CacheStore, StorageBackend, purge_storage};
use tracing::info;

use crate::broadcast::ChannelHub;
use crate::broadcaster::{BridgeHandle, CrossTabBroadcaster};

/// Must be created inside a Tokio runtime; the cross-tab listeners are
/// spawned tasks.
#[derive(Debug)]
pub struct TerminalSession {
    resolver: ContextResolver,
    guard: Guard,
    broadcaster: CrossTabBroadcaster,
    preserved_keys: Vec<String>,
    bridge: Option<BridgeHandle>,
}

impl TerminalSession {
    pub fn new(
        config: &PosConfig,
        gateway: Arc<dyn ContextGateway>,
        storage: Arc<dyn StorageBackend>,
        hub: &ChannelHub,
    ) -> Self {
        Self::with_clock(config, gateway, storage, hub, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &PosConfig,
        gateway: Arc<dyn ContextGateway>,
        storage: Arc<dyn StorageBackend>,
        hub: &ChannelHub,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache =
            CacheStore::with_namespace(storage, config.cache.namespace.clone()).with_clock(clock);
        let resolver =
            ContextResolver::new(gateway, cache.clone(), ResolverOptions::from_config(config));
        let guard = Guard::from_config(resolver.clone(), &config.guard);
        let broadcaster = CrossTabBroadcaster::from_config(&config.broadcast, hub, &cache);
        let bridge = broadcaster.attach(&resolver);

        info!(
            channels = ?broadcaster.channel_names(),
            listeners = bridge.listener_count(),
            "Terminal session started"
        );

        Self {
            resolver,
            guard,
            broadcaster,
            preserved_keys: config.logout.preserved_keys.clone(),
            bridge: Some(bridge),
        }
    }

    pub fn resolver(&self) -> &ContextResolver {
        &self.resolver
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn broadcaster(&self) -> &CrossTabBroadcaster {
        &self.broadcaster
    }

    pub fn current(&self) -> Option<OperationalContext> {
        self.resolver.current()
    }

    pub async fn resolve(&self) -> Result<Resolution, ResolutionError> {
        self.resolver.resolve().await
    }

    pub async fn select(
        &self,
        profile: &str,
        branch: &str,
    ) -> Result<OperationalContext, ResolutionError> {
        self.resolver.set_context(profile, branch).await
    }

    pub async fn check(&self, options: &GuardOptions) -> GuardState {
        self.guard.evaluate(options).await
    }

    pub fn watch(&self, options: GuardOptions) -> GuardHandle {
        self.guard.watch(options)
    }

    /// Local logout: forget the context and purge this session's storage
    /// except the preserved keys. Other tabs are not told; they pick up the
    /// logout on their next server fetch. Returns the number of purged keys.
    pub fn logout(&self) -> usize {
        self.resolver.invalidate();
        let purged = purge_storage(self.resolver.cache().backend().as_ref(), &self.preserved_keys);
        info!(purged, "Logged out of terminal session");
        purged
    }

    /// Detach from the other tabs and stop the resolver.
    pub fn close(&mut self) {
        if self.bridge.take().is_some() {
            self.resolver.dispose();
            info!("Terminal session closed");
        }
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.close();
    }
}
