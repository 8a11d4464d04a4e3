//! Operational context resolution and access guarding for a POS terminal.
//!
//! The context is resolved from three sources with precedence:
//!
//! 1. In-memory context owned by the [`ContextResolver`]
//! 2. Client-side cache (`storage::CacheStore`, with TTL)
//! 3. The server session via a [`pos_core::ContextGateway`]
//!    ([`HttpContextGateway`] in production)
//!
//! Screens use a [`Guard`] to turn a resolution (plus an optional secondary
//! resource check) into a [`GuardState`].
//!
//! # Example
//!
//! ```rust,ignore
//! use context::{ContextResolver, Guard, GuardOptions, HttpContextGateway, ResolverOptions};
//!
//! let gateway = Arc::new(HttpContextGateway::new(&config.gateway)?);
//! let resolver = ContextResolver::new(gateway, cache, ResolverOptions::from_config(&config));
//! let guard = Guard::from_config(resolver, &config.guard);
//!
//! match guard.evaluate(&GuardOptions::new("/cashier")).await.action() {
//!     GuardAction::Render => render(),
//!     GuardAction::Redirect(url) => navigate(&url),
//!     other => show(other),
//! }
//! ```

pub mod gateway;
pub mod guard;
pub mod resolver;
pub mod retry;

pub use gateway::HttpContextGateway;
pub use guard::{
    Guard, GuardAction, GuardHandle, GuardOptions, GuardState, SELECTION_REQUIRED_REASON,
    SelectionRedirect,
};
pub use resolver::{CONTEXT_CACHE_KEY, ContextResolver, ResolverOptions};
pub use retry::{RetryDecision, RetryPolicy, RetryState};
