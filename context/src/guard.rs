//! Access guard for screens that need an operational context.
//!
//! A guard resolves the context (and optionally the secondary resource, e.g.
//! the current opening) and settles on exactly one [`GuardState`]. It never
//! grants access on error and never redirects for a missing secondary
//! resource.
//!
//! ## Retry rules
//! - `NoAccess`: no retry
//! - `SelectionRequired`: re-checked up to the selection policy bound, then
//!   redirected to the selection screen
//! - `Transient` / `Malformed`: retried up to the transient policy bound, then
//!   an error state
//! - Secondary resource not found: no retry

use std::sync::Arc;

use config::GuardConfig;
use errors::{ErrorCategory, GatewayError, ResolutionError};
use pos_core::{ContextChange, OperationalContext};
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::resolver::ContextResolver;
use crate::retry::{RetryDecision, RetryPolicy, RetryState};

/// Reason code carried by a selection redirect.
pub const SELECTION_REQUIRED_REASON: &str = "selection_required";

/// Where to send the operator when a profile must be picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRedirect {
    pub reason: String,
    /// Screen to come back to after selecting.
    pub return_to: String,
    pub url: String,
}

impl SelectionRedirect {
    pub fn new(selection_route: &str, return_to: &str) -> Self {
        let encoded: String = url::form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
        Self {
            reason: SELECTION_REQUIRED_REASON.to_string(),
            return_to: return_to.to_string(),
            url: format!("{selection_route}?reason={SELECTION_REQUIRED_REASON}&returnTo={encoded}"),
        }
    }
}

/// Outcome of a guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Loading,
    Passed {
        context: OperationalContext,
        /// Set when the secondary resource was required.
        resource_id: Option<String>,
    },
    NoProfileAvailable,
    SelectionRequired { redirect: SelectionRedirect },
    SecondaryResourceMissing { context: OperationalContext },
    Error {
        message: String,
        category: ErrorCategory,
        retryable: bool,
    },
}

/// What the screen should do for a given state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardAction {
    Render,
    Redirect(String),
    /// Stay on the screen and offer a local fix (e.g. open a shift).
    InlineRemedy,
    Terminal { retry: bool },
    Wait,
}

impl GuardState {
    pub fn action(&self) -> GuardAction {
        match self {
            GuardState::Loading => GuardAction::Wait,
            GuardState::Passed { .. } => GuardAction::Render,
            GuardState::SelectionRequired { redirect } => {
                GuardAction::Redirect(redirect.url.clone())
            }
            GuardState::SecondaryResourceMissing { .. } => GuardAction::InlineRemedy,
            GuardState::NoProfileAvailable => GuardAction::Terminal { retry: false },
            GuardState::Error { retryable, .. } => GuardAction::Terminal { retry: *retryable },
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, GuardState::Loading)
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, GuardState::Passed { .. })
    }

    fn error(e: &dyn std::fmt::Display, category: ErrorCategory) -> Self {
        GuardState::Error {
            message: e.to_string(),
            category,
            retryable: category == ErrorCategory::Transient,
        }
    }
}

/// Per-screen guard requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOptions {
    pub requires_secondary_resource: bool,
    /// Route of the guarded screen, used as the redirect's `returnTo`.
    pub destination: String,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            requires_secondary_resource: false,
            destination: "/".to_string(),
        }
    }
}

impl GuardOptions {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            ..Self::default()
        }
    }

    pub fn requiring_secondary_resource(mut self) -> Self {
        self.requires_secondary_resource = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Guard {
    resolver: ContextResolver,
    selection_retry: RetryPolicy,
    transient_retry: RetryPolicy,
    selection_route: String,
}

impl Guard {
    pub fn new(resolver: ContextResolver) -> Self {
        Self::from_config(resolver, &GuardConfig::default())
    }

    pub fn from_config(resolver: ContextResolver, config: &GuardConfig) -> Self {
        Self {
            resolver,
            selection_retry: config.selection_retry.into(),
            transient_retry: config.transient_retry.into(),
            selection_route: config.selection_route.clone(),
        }
    }

    pub fn with_selection_retry(mut self, policy: RetryPolicy) -> Self {
        self.selection_retry = policy;
        self
    }

    pub fn with_transient_retry(mut self, policy: RetryPolicy) -> Self {
        self.transient_retry = policy;
        self
    }

    pub fn resolver(&self) -> &ContextResolver {
        &self.resolver
    }

    /// Run the guard to a settled (non-`Loading`) state.
    #[instrument(skip(self, options), fields(destination = %options.destination))]
    pub async fn evaluate(&self, options: &GuardOptions) -> GuardState {
        let context = match self.resolve_context(options).await {
            Ok(context) => context,
            Err(state) => return state,
        };

        if !options.requires_secondary_resource {
            return GuardState::Passed {
                context,
                resource_id: None,
            };
        }

        self.check_secondary_resource(context).await
    }

    async fn resolve_context(
        &self,
        options: &GuardOptions,
    ) -> Result<OperationalContext, GuardState> {
        let mut selection = self.selection_retry.start();
        let mut transient = self.transient_retry.start();

        loop {
            let err = match self.resolver.resolve().await {
                Ok(resolution) => return Ok(resolution.context),
                Err(e) => e,
            };

            match err.category() {
                ErrorCategory::NoAccess => {
                    info!(destination = %options.destination, "No eligible profile, access denied");
                    return Err(GuardState::NoProfileAvailable);
                }
                ErrorCategory::SelectionRequired => {
                    if let RetryDecision::Retry(delay) = selection.next() {
                        debug!(attempt = selection.attempts(), "Selection required, re-checking");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    info!(destination = %options.destination, "Redirecting to profile selection");
                    return Err(GuardState::SelectionRequired {
                        redirect: SelectionRedirect::new(
                            &self.selection_route,
                            &options.destination,
                        ),
                    });
                }
                category => {
                    self.log_failure(&err, &transient);
                    match transient.next() {
                        RetryDecision::Retry(delay) => tokio::time::sleep(delay).await,
                        RetryDecision::Exhausted => return Err(GuardState::error(&err, category)),
                    }
                }
            }
        }
    }

    async fn check_secondary_resource(&self, context: OperationalContext) -> GuardState {
        let mut transient = self.transient_retry.start();

        loop {
            let err = match self.resolver.secondary_resource_status().await {
                Ok(status) if status.is_open() => {
                    return GuardState::Passed {
                        context,
                        resource_id: status.resource_id,
                    };
                }
                Ok(_) | Err(GatewayError::NotFound { .. }) => {
                    info!(%context, "Secondary resource missing");
                    return GuardState::SecondaryResourceMissing { context };
                }
                Err(e) => e,
            };

            let resolution_err = ResolutionError::from(err.clone());
            self.log_failure(&resolution_err, &transient);
            match transient.next() {
                RetryDecision::Retry(delay) => tokio::time::sleep(delay).await,
                RetryDecision::Exhausted => {
                    return GuardState::error(&err, resolution_err.category());
                }
            }
        }
    }

    fn log_failure(&self, err: &ResolutionError, retry: &RetryState) {
        let attempt = retry.attempts() + 1;
        let max_attempts = retry.policy().max_attempts;
        if err.category() == ErrorCategory::Malformed {
            error!(attempt, max_attempts, error = %err, "Malformed server response");
        } else {
            warn!(attempt, max_attempts, error = %err, "Transient failure");
        }
    }

    /// Evaluate in the background and keep re-evaluating on every context
    /// change. Dropping the returned handle stops the task.
    pub fn watch(&self, options: GuardOptions) -> GuardHandle {
        let (tx, rx) = watch::channel(GuardState::Loading);
        let retry = Arc::new(Notify::new());
        let changes = self.resolver.subscribe();

        let task = tokio::spawn(run_watch(self.clone(), options, tx, changes, Arc::clone(&retry)));

        GuardHandle {
            state: rx,
            retry,
            task,
        }
    }
}

async fn run_watch(
    guard: Guard,
    options: GuardOptions,
    tx: watch::Sender<GuardState>,
    mut changes: broadcast::Receiver<ContextChange>,
    retry: Arc<Notify>,
) {
    loop {
        tx.send_if_modified(|state| {
            if state.is_loading() {
                return false;
            }
            *state = GuardState::Loading;
            true
        });

        let state = guard.evaluate(&options).await;
        debug!(destination = %options.destination, ?state, "Guard settled");
        tx.send_replace(state.clone());

        loop {
            tokio::select! {
                change = changes.recv() => match change {
                    Ok(change) if already_reflects(&state, &change) => continue,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => return
                },
                () = retry.notified() => break,
                () = tx.closed() => return
            }
        }
    }
}

/// True when `change` leaves a passed guard's outcome unchanged.
fn already_reflects(state: &GuardState, change: &ContextChange) -> bool {
    match (state, &change.context) {
        (GuardState::Passed { context, .. }, Some(changed)) => context == changed,
        _ => false,
    }
}

/// Live view of a watching guard.
#[derive(Debug)]
pub struct GuardHandle {
    state: watch::Receiver<GuardState>,
    retry: Arc<Notify>,
    task: JoinHandle<()>,
}

impl GuardHandle {
    pub fn state(&self) -> GuardState {
        self.state.borrow().clone()
    }

    pub fn receiver(&self) -> watch::Receiver<GuardState> {
        self.state.clone()
    }

    /// Wait for the next published state.
    pub async fn changed(&mut self) -> Option<GuardState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&GuardState) -> bool,
    ) -> Option<GuardState> {
        self.state.wait_for(predicate).await.ok().map(|state| state.clone())
    }

    /// Wait for the first non-`Loading` state.
    pub async fn settled(&mut self) -> Option<GuardState> {
        self.wait_for(|state| !state.is_loading()).await
    }

    /// Re-run the evaluation (the manual "retry" of a retryable error).
    pub fn retry(&self) {
        self.retry.notify_one();
    }
}

impl Drop for GuardHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
