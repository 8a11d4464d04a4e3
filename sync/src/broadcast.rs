//! Topic-based in-process broadcast channel (the `BroadcastChannel` of a
//! browser origin).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use pos_core::StampedContext;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::channel::{self, ChannelListener, ContextChannel};
use crate::error::Result;

const TOPIC_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Envelope {
    sender: Option<Uuid>,
    payload: String,
}

/// Registry of named topics shared by every session of a process.
#[derive(Debug, Clone, Default)]
pub struct ChannelHub {
    topics: Arc<DashMap<String, broadcast::Sender<Envelope>>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Envelope> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Join `topic` as a new participant.
    pub fn open(&self, topic: &str) -> BroadcastChannelTransport {
        BroadcastChannelTransport {
            topic: topic.to_string(),
            id: Uuid::new_v4(),
            tx: self.sender(topic),
        }
    }

    /// Post an arbitrary payload to every participant of `topic`.
    pub fn post_raw(&self, topic: &str, payload: impl Into<String>) {
        let _ = self.sender(topic).send(Envelope {
            sender: None,
            payload: payload.into(),
        });
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

/// One participant of a hub topic. Its own messages are not delivered back
/// to it.
#[derive(Debug, Clone)]
pub struct BroadcastChannelTransport {
    topic: String,
    id: Uuid,
    tx: broadcast::Sender<Envelope>,
}

impl BroadcastChannelTransport {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl ContextChannel for BroadcastChannelTransport {
    fn name(&self) -> &'static str {
        "broadcast_channel"
    }

    fn publish(&self, stamped: &StampedContext) -> Result<()> {
        let payload = channel::encode(stamped)?;
        match self.tx.send(Envelope {
            sender: Some(self.id),
            payload,
        }) {
            Ok(receivers) => trace!(topic = %self.topic, receivers, "Context broadcast"),
            Err(_) => trace!(topic = %self.topic, "No listeners on topic"),
        }
        Ok(())
    }

    fn listen(&self) -> Option<Box<dyn ChannelListener>> {
        Some(Box::new(BroadcastListener {
            topic: self.topic.clone(),
            id: self.id,
            rx: self.tx.subscribe(),
        }))
    }
}

struct BroadcastListener {
    topic: String,
    id: Uuid,
    rx: broadcast::Receiver<Envelope>,
}

#[async_trait]
impl ChannelListener for BroadcastListener {
    async fn recv(&mut self) -> Option<StampedContext> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.sender == Some(self.id) => continue,
                Ok(envelope) => {
                    if let Some(stamped) = channel::decode(&envelope.payload) {
                        return Some(stamped);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "Broadcast listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(topic = %self.topic, "Broadcast topic closed");
                    return None;
                }
            }
        }
    }
}
