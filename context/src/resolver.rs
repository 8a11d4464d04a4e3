//! Operational context resolution.
//!
//! Resolves the (profile, branch) pair for one terminal session from, in
//! order:
//! 1. The in-memory context owned by the resolver
//! 2. The client-side cache (if the entry is valid and not expired)
//! 3. The server session (`GetOperationalContext`), including deterministic
//!    auto-selection when exactly one profile with a default branch is
//!    eligible
//!
//! Concurrent callers share a single in-flight server fetch. Every fetch,
//! `set_context`, `invalidate` and remote adoption takes a sequence number at
//! issue time; a completion is only applied when its number is newer than the
//! last applied one, so a late response never overwrites a later decision.
//!
//! Across sessions, changes are ordered by stamp (see [`StampedContext`]).
//! Every adopted context carries one into the cache and onto the change
//! feed, and a context announced by another session is only adopted when
//! its stamp is newer than anything this session has seen.
//!
//! # Example
//!
//! ```rust,ignore
//! use context::{ContextResolver, ResolverOptions};
//!
//! let resolver = ContextResolver::new(gateway, cache, ResolverOptions::default());
//! let resolution = resolver.resolve().await?;
//! println!("{} (from {})", resolution.context, resolution.source);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use config::PosConfig;
use errors::{GatewayError, ResolutionError};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use pos_core::{
    ChangeOrigin, ContextChange, ContextGateway, OperationalContext, OperationalContextResponse,
    Resolution, ResolutionSource, SecondaryResourceStatus, StampedContext,
};
use storage::CacheStore;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, trace, warn};

/// Cache key (inside the cache namespace) of the persisted context.
pub const CONTEXT_CACHE_KEY: &str = "operational-context";

const CHANGE_FEED_CAPACITY: usize = 64;

/// Resolver tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// TTL of the cached context. `None` never expires.
    pub context_ttl_seconds: Option<u64>,
    pub metrics_enabled: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            context_ttl_seconds: Some(8 * 60 * 60),
            metrics_enabled: true,
        }
    }
}

impl ResolverOptions {
    pub fn from_config(config: &PosConfig) -> Self {
        Self {
            context_ttl_seconds: config.cache.context_ttl_seconds,
            metrics_enabled: config.observability.metrics_enabled,
        }
    }
}

/// Outcome of one server fetch, shared by every caller that joined it.
/// The flag says whether the fetch's result was adopted.
type FetchOutcome = (Result<Resolution, ResolutionError>, bool);

#[derive(Clone)]
struct InFlight {
    seq: u64,
    future: Shared<BoxFuture<'static, FetchOutcome>>,
}

struct State {
    memory: Option<OperationalContext>,
    /// Stamp of the latest change adopted or made here, clears included.
    stamp: u64,
    last_applied: u64,
    in_flight: Option<InFlight>,
    disposed: bool,
}

struct Inner {
    gateway: Arc<dyn ContextGateway>,
    cache: CacheStore,
    options: ResolverOptions,
    state: Mutex<State>,
    next_seq: AtomicU64,
    changes: broadcast::Sender<ContextChange>,
}

/// Owns the operational context of one terminal session.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct ContextResolver {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ContextResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ContextResolver")
            .field("memory", &state.memory)
            .field("stamp", &state.stamp)
            .field("last_applied", &state.last_applied)
            .field("in_flight", &state.in_flight.as_ref().map(|f| f.seq))
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl ContextResolver {
    pub fn new(
        gateway: Arc<dyn ContextGateway>,
        cache: CacheStore,
        options: ResolverOptions,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                gateway,
                cache,
                options,
                state: Mutex::new(State {
                    memory: None,
                    stamp: 0,
                    last_applied: 0,
                    in_flight: None,
                    disposed: false,
                }),
                next_seq: AtomicU64::new(0),
                changes,
            }),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    /// The currently adopted context, if any.
    pub fn current(&self) -> Option<OperationalContext> {
        self.inner.state.lock().memory.clone()
    }

    /// Feed of adopted-context changes, local and remote.
    pub fn subscribe(&self) -> broadcast::Receiver<ContextChange> {
        self.inner.changes.subscribe()
    }

    /// Resolve the operational context.
    ///
    /// Short-circuits at the first source that yields a valid context.
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> Result<Resolution, ResolutionError> {
        if let Some(context) = self.current() {
            trace!(%context, "Context resolved from memory");
            return Ok(self.inner.resolved(context, ResolutionSource::Memory));
        }

        if let Some(StampedContext { context, stamp }) = self
            .inner
            .cache
            .get::<StampedContext>(CONTEXT_CACHE_KEY)
            .and_then(StampedContext::validated)
        {
            let seq = self.inner.take_seq();
            let adopted = self.inner.apply(
                seq,
                Some(context.clone()),
                ChangeOrigin::Local,
                Stamp::Carried(stamp),
                false,
            );
            if adopted {
                debug!(%context, "Context adopted from cache");
                return Ok(self.inner.resolved(context, ResolutionSource::Cache));
            }
            if let Some(current) = self.current() {
                return Ok(self.inner.resolved(current, ResolutionSource::Memory));
            }
        }

        let flight = self.join_or_start_fetch();
        let (outcome, applied) = flight.future.await;

        match outcome {
            Ok(resolution) if applied => {
                Ok(self.inner.resolved(resolution.context, resolution.source))
            }
            Ok(resolution) => match self.current() {
                Some(current) => {
                    debug!(
                        seq = flight.seq,
                        %current,
                        "Superseded fetch, returning adopted context"
                    );
                    Ok(self.inner.resolved(current, ResolutionSource::Memory))
                }
                None => {
                    debug!(seq = flight.seq, "Superseded fetch, result not adopted");
                    Ok(resolution)
                }
            },
            Err(e) => {
                self.inner.record_failure(&e);
                Err(e)
            }
        }
    }

    fn join_or_start_fetch(&self) -> InFlight {
        let mut state = self.inner.state.lock();
        if let Some(flight) = &state.in_flight {
            trace!(seq = flight.seq, "Joining in-flight context fetch");
            return flight.clone();
        }

        let seq = self.inner.take_seq();
        let inner = Arc::clone(&self.inner);
        let future = async move { inner.fetch(seq).await }.boxed().shared();
        let flight = InFlight { seq, future };
        state.in_flight = Some(flight.clone());
        flight
    }

    /// Select a context explicitly. Always persisted in the server session
    /// first; memory and cache follow only on success.
    #[instrument(skip(self))]
    pub async fn set_context(
        &self,
        profile: &str,
        branch: &str,
    ) -> Result<OperationalContext, ResolutionError> {
        let requested = OperationalContext::new(profile.trim(), branch.trim());
        if requested.profile.is_empty() {
            return Err(ResolutionError::InvalidInput {
                field: "profile".to_string(),
            });
        }
        if requested.branch.is_empty() {
            return Err(ResolutionError::InvalidInput {
                field: "branch".to_string(),
            });
        }

        let seq = self.inner.take_seq();
        let result = self.inner.select(&requested).await;

        let context = match result {
            Ok(context) => context,
            Err(e) => {
                self.inner.record_failure(&e);
                return Err(e);
            }
        };

        if self
            .inner
            .apply(seq, Some(context.clone()), ChangeOrigin::Local, Stamp::Fresh, true)
        {
            info!(%context, "Operational context selected");
            return Ok(context);
        }

        debug!(seq, "Superseded selection");
        Ok(self.current().unwrap_or(context))
    }

    /// Forget the context locally (memory and cache). Pending fetches become
    /// stale. The server session is left untouched.
    pub fn invalidate(&self) {
        let seq = self.inner.take_seq();
        let mut state = self.inner.state.lock();
        if state.disposed {
            return;
        }

        let stamp = self.inner.next_stamp(state.stamp);
        state.memory = None;
        state.stamp = stamp;
        state.last_applied = seq;
        state.in_flight = None;
        self.inner.cache.remove(CONTEXT_CACHE_KEY);
        drop(state);

        debug!(seq, stamp, "Operational context invalidated");
        let _ = self.inner.changes.send(ContextChange {
            context: None,
            origin: ChangeOrigin::Local,
            stamp,
        });
    }

    /// Adopt a context announced by another session.
    ///
    /// Only a change newer than the latest one this session has made or
    /// adopted is taken, so late, repeated and out-of-order deliveries are
    /// dropped. Returns whether the adopted context changed.
    pub fn apply_remote(&self, incoming: StampedContext) -> bool {
        if !incoming.context.is_valid() {
            debug!(?incoming, "Ignoring invalid remote context");
            return false;
        }

        let adopted = self.inner.adopt_remote(&incoming);
        if adopted {
            info!(
                context = %incoming.context,
                stamp = incoming.stamp,
                "Adopted operational context from another session"
            );
        }
        adopted
    }

    /// Status of the secondary resource (e.g. the current opening).
    pub async fn secondary_resource_status(&self) -> Result<SecondaryResourceStatus, GatewayError> {
        self.inner.gateway.get_secondary_resource_status().await
    }

    /// Stop applying anything. Pending fetches complete without effect and
    /// no further changes are emitted.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        state.disposed = true;
        state.in_flight = None;
        debug!("Context resolver disposed");
    }
}

impl Inner {
    fn take_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Wall-clock millis, but always past `last`.
    fn next_stamp(&self, last: u64) -> u64 {
        let now = u64::try_from(self.cache.clock().now_millis()).unwrap_or(0);
        now.max(last.saturating_add(1))
    }

    /// Adopt `context` if `seq` is newer than the last applied change.
    fn apply(
        &self,
        seq: u64,
        context: Option<OperationalContext>,
        origin: ChangeOrigin,
        stamp: Stamp,
        write_cache: bool,
    ) -> bool {
        let mut state = self.state.lock();
        if state.disposed || seq <= state.last_applied {
            if self.options.metrics_enabled {
                metrics::counter!("pos_context_stale_responses_total").increment(1);
            }
            return false;
        }

        state.last_applied = seq;
        if state.memory == context {
            return true;
        }
        let stamp = match stamp {
            Stamp::Fresh => self.next_stamp(state.stamp),
            Stamp::Carried(stamp) => stamp,
        };
        state.memory.clone_from(&context);
        state.stamp = state.stamp.max(stamp);

        if write_cache {
            match &context {
                Some(ctx) => self.cache.set(
                    CONTEXT_CACHE_KEY,
                    &StampedContext::new(ctx.clone(), stamp),
                    self.options.context_ttl_seconds,
                ),
                None => self.cache.remove(CONTEXT_CACHE_KEY),
            }
        }
        drop(state);

        let _ = self.changes.send(ContextChange {
            context,
            origin,
            stamp,
        });
        true
    }

    /// Adopt another session's change when it is newer than the latest one
    /// seen here. The shared cache is only rewritten when it holds something
    /// older, so an adoption never bounces back as a fresh storage event.
    fn adopt_remote(&self, incoming: &StampedContext) -> bool {
        let mut state = self.state.lock();
        if state.disposed {
            return false;
        }

        let newer = match &state.memory {
            Some(memory) => incoming.supersedes(&StampedContext::new(memory.clone(), state.stamp)),
            None => incoming.stamp > state.stamp,
        };
        if !newer {
            trace!(%incoming, latest = state.stamp, "Remote context is not newer, ignoring");
            return false;
        }

        state.stamp = incoming.stamp;
        if state.memory.as_ref() == Some(&incoming.context) {
            return false;
        }
        // Pending fetches and selections issued before this point are stale.
        state.last_applied = self.take_seq();
        state.memory = Some(incoming.context.clone());

        let stored = self.cache.get::<StampedContext>(CONTEXT_CACHE_KEY);
        if stored.is_none_or(|stored| incoming.supersedes(&stored)) {
            self.cache
                .set(CONTEXT_CACHE_KEY, incoming, self.options.context_ttl_seconds);
        }
        drop(state);

        let _ = self.changes.send(ContextChange {
            context: Some(incoming.context.clone()),
            origin: ChangeOrigin::Remote,
            stamp: incoming.stamp,
        });
        true
    }

    async fn fetch(self: Arc<Self>, seq: u64) -> FetchOutcome {
        if self.options.metrics_enabled {
            metrics::counter!("pos_context_server_fetches_total").increment(1);
        }
        debug!(seq, "Fetching operational context from server");

        let outcome = self.fetch_from_server(seq).await;
        let applied = match &outcome {
            Ok(resolution) => self.apply(
                seq,
                Some(resolution.context.clone()),
                ChangeOrigin::Local,
                Stamp::Fresh,
                true,
            ),
            Err(_) => false,
        };

        let mut state = self.state.lock();
        if state.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
            state.in_flight = None;
        }

        (outcome, applied)
    }

    async fn fetch_from_server(&self, seq: u64) -> Result<Resolution, ResolutionError> {
        let response = self
            .gateway
            .get_operational_context()
            .await
            .map_err(|e| {
                if let GatewayError::Malformed { endpoint, reason } = &e {
                    error!(
                        endpoint = %endpoint,
                        reason = %reason,
                        "Malformed operational context payload"
                    );
                }
                ResolutionError::from(e)
            })?;

        match classify(&response)? {
            ServerSelection::Active(context) => {
                Ok(Resolution::new(context, ResolutionSource::ServerActive))
            }
            ServerSelection::AutoSelect(context) => {
                if self.is_stale(seq) {
                    debug!(seq, "Skipping auto-select write-back for superseded fetch");
                    return Ok(Resolution::new(context, ResolutionSource::ServerAutoSelected));
                }

                info!(%context, "Auto-selecting the only eligible profile");
                let confirmed = self.write_back(&context).await?;
                Ok(Resolution::new(confirmed, ResolutionSource::ServerAutoSelected))
            }
        }
    }

    async fn write_back(
        &self,
        context: &OperationalContext,
    ) -> Result<OperationalContext, ResolutionError> {
        let response = self
            .gateway
            .set_operational_context(&context.profile, &context.branch)
            .await
            .map_err(|e| {
                warn!(error = %e, "Auto-select write-back failed");
                ResolutionError::transient(format!("auto-select write-back failed: {e}"))
            })?;

        if !response.success {
            return Err(ResolutionError::transient(format!(
                "auto-select write-back refused: {}",
                response.message.unwrap_or_default()
            )));
        }

        let mut confirmed = response
            .context
            .and_then(|payload| payload.into_context())
            .unwrap_or_else(|| context.clone());
        if confirmed.company.is_none() {
            confirmed.company.clone_from(&context.company);
        }
        Ok(confirmed)
    }

    async fn select(
        &self,
        requested: &OperationalContext,
    ) -> Result<OperationalContext, ResolutionError> {
        let response = self
            .gateway
            .set_operational_context(&requested.profile, &requested.branch)
            .await?;

        if !response.success {
            let message = response.message.unwrap_or_else(|| "selection refused".to_string());
            error!(context = %requested, message = %message, "Server refused context selection");
            return Err(ResolutionError::malformed(message));
        }

        match response.context {
            Some(payload) => payload.into_context().ok_or_else(|| {
                error!(context = %requested, "Server confirmed an invalid context");
                ResolutionError::malformed("server confirmed an invalid context")
            }),
            None => Ok(requested.clone()),
        }
    }

    fn is_stale(&self, seq: u64) -> bool {
        let state = self.state.lock();
        state.disposed || seq <= state.last_applied
    }

    fn resolved(&self, context: OperationalContext, source: ResolutionSource) -> Resolution {
        if self.options.metrics_enabled {
            metrics::counter!("pos_context_resolutions_total", "source" => source.to_string())
                .increment(1);
        }
        Resolution::new(context, source)
    }

    fn record_failure(&self, e: &ResolutionError) {
        debug!(category = %e.category(), error = %e, "Context resolution failed");
        if self.options.metrics_enabled {
            metrics::counter!(
                "pos_context_resolution_failures_total",
                "category" => e.category().as_str()
            )
            .increment(1);
        }
    }
}

/// How an adopted change is stamped.
#[derive(Debug, Clone, Copy)]
enum Stamp {
    /// A new decision made by this session.
    Fresh,
    /// Keep the stamp the context was stored with.
    Carried(u64),
}

enum ServerSelection {
    Active(OperationalContext),
    AutoSelect(OperationalContext),
}

fn classify(response: &OperationalContextResponse) -> Result<ServerSelection, ResolutionError> {
    if !response.has_access {
        return Err(ResolutionError::NoAccess);
    }
    if let Some(active) = response.active_selection() {
        return Ok(ServerSelection::Active(active));
    }
    if let Some(auto) = response.auto_selection() {
        return Ok(ServerSelection::AutoSelect(auto));
    }
    if response.eligible_profiles.is_empty() {
        return Err(ResolutionError::NoAccess);
    }
    Err(ResolutionError::SelectionRequired {
        eligible: response.eligible_profiles.len(),
    })
}
