//! In-process fan-out feeding the `/ws` endpoint.
//!
//! [`LocalBus`] is itself the publisher for `{"kind":"local"}` targets.
//! Events are shared as `Arc`s so a burst to many WebSocket sessions does
//! not copy bodies per subscriber. Subscribers that fall behind the ring
//! buffer skip the lost events and carry on.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use super::FanoutPublisher;
use crate::domain::FanoutEvent;
use crate::error::RelayError;

/// Broadcast bus of fanned-out events.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<Arc<FanoutEvent>>,
}

impl LocalBus {
    /// Creates a bus buffering up to `capacity` events per lagging
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Starts receiving every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> TopicReceiver {
        TopicReceiver {
            rx: self.sender.subscribe(),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl FanoutPublisher for LocalBus {
    async fn publish(&self, topic: &str, event: &str, data: &serde_json::Value) -> Result<(), RelayError> {
        let event = Arc::new(FanoutEvent::new(topic, event, data.clone()));
        // No subscribers is not a failure: nobody asked for this topic.
        let receivers = self.sender.send(event).unwrap_or(0);
        tracing::debug!(topic, receivers, "published to local bus");
        Ok(())
    }
}

/// One subscriber's view of a [`LocalBus`].
#[derive(Debug)]
pub struct TopicReceiver {
    rx: broadcast::Receiver<Arc<FanoutEvent>>,
}

impl TopicReceiver {
    /// Waits for the next event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Arc<FanoutEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "local subscriber lagged behind fan-out bus");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next already-published event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<FanoutEvent>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "local subscriber lagged behind fan-out bus");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}
