//! Transport abstraction for cross-tab context messages.
//!
//! Wire format: a JSON object `{"profile": ..., "branch": ..., "stamp": ...}`
//! with an optional `"company"`. `stamp` orders the change against changes
//! made in other tabs. Anything else is dropped on receipt.

use async_trait::async_trait;
use pos_core::StampedContext;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Encode a context for the wire. Invalid contexts are never sent.
pub fn encode(stamped: &StampedContext) -> Result<String> {
    if !stamped.context.is_valid() {
        return Err(SyncError::InvalidContext(stamped.context.to_string()));
    }
    Ok(serde_json::to_string(stamped)?)
}

/// Decode a wire message. Malformed, partial or unstamped messages yield
/// `None`.
pub fn decode(raw: &str) -> Option<StampedContext> {
    match serde_json::from_str::<StampedContext>(raw) {
        Ok(stamped) if stamped.context.is_valid() => Some(stamped),
        Ok(stamped) => {
            debug!(?stamped, "Dropping incomplete context message");
            None
        }
        Err(e) => {
            debug!(error = %e, "Dropping malformed context message");
            None
        }
    }
}

/// Incoming side of a channel.
#[async_trait]
pub trait ChannelListener: Send {
    /// Next valid context from another tab, or `None` once the channel is
    /// gone.
    async fn recv(&mut self) -> Option<StampedContext>;
}

/// One way of telling other tabs about a context change.
pub trait ContextChannel: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn publish(&self, stamped: &StampedContext) -> Result<()>;

    /// Start listening. `None` when the transport cannot receive.
    fn listen(&self) -> Option<Box<dyn ChannelListener>>;
}
