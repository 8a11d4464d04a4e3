use async_trait::async_trait;
use errors::GatewayError;
use parking_lot::Mutex;
use pos_core::{
    ContextGateway, OperationalContextResponse, SecondaryResourceStatus, SelectionPayload,
    SetContextResponse,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Scripted<T> {
    result: Result<T, GatewayError>,
    delay: Duration,
}

impl<T> Scripted<T> {
    fn now(result: Result<T, GatewayError>) -> Self {
        Self {
            result,
            delay: Duration::ZERO,
        }
    }
}

async fn play<T>(scripted: Scripted<T>) -> Result<T, GatewayError> {
    if !scripted.delay.is_zero() {
        tokio::time::sleep(scripted.delay).await;
    }
    scripted.result
}

/// A [`ContextGateway`] driven by a script.
///
/// Queued answers are consumed in call order; once a queue is empty the
/// fallback answer repeats. Selections default to echoing the requested pair
/// back with `success: true`.
#[derive(Debug)]
pub struct ScriptedGateway {
    context_queue: Mutex<VecDeque<Scripted<OperationalContextResponse>>>,
    context_fallback: Mutex<Option<Scripted<OperationalContextResponse>>>,
    select_queue: Mutex<VecDeque<Scripted<SetContextResponse>>>,
    secondary: Mutex<Result<SecondaryResourceStatus, GatewayError>>,
    selections: Mutex<Vec<(String, String)>>,
    context_calls: AtomicUsize,
    select_calls: AtomicUsize,
    secondary_calls: AtomicUsize,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            context_queue: Mutex::new(VecDeque::new()),
            context_fallback: Mutex::new(None),
            select_queue: Mutex::new(VecDeque::new()),
            secondary: Mutex::new(Ok(SecondaryResourceStatus::missing())),
            selections: Mutex::new(Vec::new()),
            context_calls: AtomicUsize::new(0),
            select_calls: AtomicUsize::new(0),
            secondary_calls: AtomicUsize::new(0),
        }
    }

    /// Answer every `GetOperationalContext` with `response` once the queue
    /// is drained.
    pub fn with_context(self, response: OperationalContextResponse) -> Self {
        *self.context_fallback.lock() = Some(Scripted::now(Ok(response)));
        self
    }

    pub fn with_context_error(self, error: GatewayError) -> Self {
        *self.context_fallback.lock() = Some(Scripted::now(Err(error)));
        self
    }

    /// Queue one answer delivered after `delay`.
    pub fn then_context_after(self, delay: Duration, response: OperationalContextResponse) -> Self {
        self.push_context(delay, Ok(response));
        self
    }

    pub fn then_context_error(self, error: GatewayError) -> Self {
        self.push_context(Duration::ZERO, Err(error));
        self
    }

    pub fn then_select(self, result: Result<SetContextResponse, GatewayError>) -> Self {
        self.select_queue.lock().push_back(Scripted::now(result));
        self
    }

    pub fn then_select_after(
        self,
        delay: Duration,
        result: Result<SetContextResponse, GatewayError>,
    ) -> Self {
        self.select_queue.lock().push_back(Scripted { result, delay });
        self
    }

    pub fn with_secondary(self, result: Result<SecondaryResourceStatus, GatewayError>) -> Self {
        self.set_secondary(result);
        self
    }

    pub fn push_context(
        &self,
        delay: Duration,
        result: Result<OperationalContextResponse, GatewayError>,
    ) {
        self.context_queue.lock().push_back(Scripted { result, delay });
    }

    pub fn set_secondary(&self, result: Result<SecondaryResourceStatus, GatewayError>) {
        *self.secondary.lock() = result;
    }

    pub fn context_calls(&self) -> usize {
        self.context_calls.load(Ordering::SeqCst)
    }

    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    pub fn secondary_calls(&self) -> usize {
        self.secondary_calls.load(Ordering::SeqCst)
    }

    /// Every `(profile, branch)` pair sent to `SetOperationalContext`.
    pub fn selections(&self) -> Vec<(String, String)> {
        self.selections.lock().clone()
    }
}

#[async_trait]
impl ContextGateway for ScriptedGateway {
    async fn get_operational_context(&self) -> Result<OperationalContextResponse, GatewayError> {
        self.context_calls.fetch_add(1, Ordering::SeqCst);

        let next = self.context_queue.lock().pop_front();
        let scripted = match next {
            Some(scripted) => scripted,
            None => match self.context_fallback.lock().clone() {
                Some(fallback) => fallback,
                None => Scripted::now(Err(GatewayError::Transient {
                    reason: "no scripted response".to_string(),
                })),
            }
        };

        tracing::trace!(call = self.context_calls(), "Scripted GetOperationalContext");
        play(scripted).await
    }

    async fn set_operational_context(
        &self,
        profile: &str,
        branch: &str,
    ) -> Result<SetContextResponse, GatewayError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        self.selections
            .lock()
            .push((profile.to_string(), branch.to_string()));

        let next = self.select_queue.lock().pop_front();
        let scripted = next.unwrap_or_else(|| {
            Scripted::now(Ok(SetContextResponse {
                success: true,
                context: Some(SelectionPayload {
                    profile: Some(profile.to_string()),
                    branch: Some(branch.to_string()),
                    company: None,
                }),
                message: None,
            }))
        });

        play(scripted).await
    }

    async fn get_secondary_resource_status(
        &self,
    ) -> Result<SecondaryResourceStatus, GatewayError> {
        self.secondary_calls.fetch_add(1, Ordering::SeqCst);
        self.secondary.lock().clone()
    }
}
