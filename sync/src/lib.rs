//! # Cross-Tab Sync
//!
//! Keeps the operational context of every terminal session (tab) sharing a
//! storage area and a broadcast hub in agreement.
//!
//! Two transports carry changes, either of which is enough to converge:
//! - [`StorageEventTransport`]: change notifications of the shared storage
//! - [`BroadcastChannelTransport`]: an explicit topic on a [`ChannelHub`]
//!
//! Adoption is idempotent, so duplicate deliveries over both transports do
//! not ping-pong between tabs.

pub mod broadcast;
pub mod broadcaster;
pub mod channel;
pub mod error;
pub mod session;
pub mod storage_event;

pub use broadcast::{BroadcastChannelTransport, ChannelHub};
pub use broadcaster::{BridgeHandle, CrossTabBroadcaster, Subscription};
pub use channel::{ChannelListener, ContextChannel};
pub use error::{Result, SyncError};
pub use session::TerminalSession;
pub use storage_event::StorageEventTransport;
