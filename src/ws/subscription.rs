//! Per-connection subscription manager.
//!
//! Tracks which channels a WebSocket client follows and filters fan-out
//! events by topic.

use std::collections::HashSet;

use crate::domain::ChannelId;

/// Manages the set of channel subscriptions for a single WebSocket
/// connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed topics. Ignored while `subscribe_all` is set.
    topics: HashSet<String>,
    /// Whether the client follows every channel (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds channels to the subscription set. `wildcard` enables `"*"`.
    pub fn subscribe(&mut self, ids: &[ChannelId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        self.topics.extend(ids.iter().map(ChannelId::topic));
    }

    /// Removes channels from the subscription set. `wildcard` disables `"*"`.
    pub fn unsubscribe(&mut self, ids: &[ChannelId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for id in ids {
            self.topics.remove(&id.topic());
        }
    }

    /// Returns `true` if events on `topic` should reach this client.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        self.subscribe_all || self.topics.contains(topic)
    }

    /// Returns the number of explicitly subscribed channels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.topics.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub const fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(&ChannelId::generate().topic()));
    }

    #[test]
    fn subscribe_specific_channel() {
        let mut mgr = SubscriptionManager::new();
        let id = ChannelId::generate();
        mgr.subscribe(&[id], false);
        assert!(mgr.matches(&id.topic()));
        assert!(!mgr.matches(&ChannelId::generate().topic()));
    }

    #[test]
    fn wildcard_matches_everything_until_removed() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[], true);
        assert!(mgr.matches("private-anything"));
        mgr.unsubscribe(&[], true);
        assert!(!mgr.matches("private-anything"));
    }

    #[test]
    fn unsubscribe_removes_channel() {
        let mut mgr = SubscriptionManager::new();
        let id = ChannelId::generate();
        mgr.subscribe(&[id, ChannelId::generate()], false);
        assert_eq!(mgr.count(), 2);
        mgr.unsubscribe(&[id], false);
        assert!(!mgr.matches(&id.topic()));
        assert_eq!(mgr.count(), 1);
    }
}
