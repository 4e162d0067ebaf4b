//! Events forwarded to pub/sub subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A webhook event forwarded to a channel's private topic.
///
/// `data` carries the original body alongside the signature and the
/// verification result so subscribers can make their own trust decision.
#[derive(Debug, Clone, Serialize)]
pub struct FanoutEvent {
    /// Topic the event was published to (`private-<channel id>`).
    pub topic: String,
    /// Scheme-specific event label (e.g. `WEBHOOK_MATTR_EVENT`).
    pub event: String,
    /// Event payload.
    pub data: serde_json::Value,
    /// Time the relay published the event.
    pub timestamp: DateTime<Utc>,
}

impl FanoutEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(topic: impl Into<String>, event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_topic_and_event() {
        let event = FanoutEvent::new(
            "private-1",
            "WEBHOOK_MATTR_EVENT",
            serde_json::json!({ "body": 1 }),
        );
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"topic\":\"private-1\""));
        assert!(json.contains("WEBHOOK_MATTR_EVENT"));
    }
}
