//! Event-scheme registry.
//!
//! An [`EventScheme`] recognizes one webhook payload shape and knows how
//! to turn it into a telemetry point, which fan-out event label to use and
//! how to identify presentation bodies. Schemes are tried in registration
//! order; the first match wins.

pub mod mattr;

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::ChannelId;
use crate::telemetry::DataPoint;

pub use mattr::MattrScheme;

/// Inputs available when building a telemetry point.
#[derive(Debug, Clone, Copy)]
pub struct PointContext<'a> {
    /// Channel the event arrived on.
    pub channel_id: ChannelId,
    /// Parsed request body.
    pub body: &'a Value,
    /// Time the relay received the request.
    pub received_at: DateTime<Utc>,
}

/// Scheme-specific behavior for one payload shape.
pub trait EventScheme: Send + Sync + fmt::Debug {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Whether `body` is an event of this scheme.
    fn matches(&self, body: &Value) -> bool;

    /// Builds the delivery-latency point for a matching event.
    ///
    /// Returns `None` when the body lacks usable timestamps.
    fn telemetry_point(&self, ctx: &PointContext<'_>) -> Option<DataPoint>;

    /// Event label used when fanning out.
    fn fanout_event_type(&self) -> &'static str;

    /// Extracts the storage id if `body` is a presentation of this scheme.
    fn presentation_id(&self, _body: &Value) -> Option<String> {
        None
    }
}

/// Ordered collection of [`EventScheme`]s.
#[derive(Debug)]
pub struct SchemeRegistry {
    schemes: Vec<Box<dyn EventScheme>>,
}

impl SchemeRegistry {
    /// Creates a registry trying `schemes` in order.
    #[must_use]
    pub fn new(schemes: Vec<Box<dyn EventScheme>>) -> Self {
        Self { schemes }
    }

    /// The schemes shipped with the relay.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(vec![Box::new(MattrScheme)])
    }

    /// Returns the first scheme whose event shape matches `body`.
    #[must_use]
    pub fn identify(&self, body: &Value) -> Option<&dyn EventScheme> {
        self.schemes
            .iter()
            .map(|scheme| &**scheme)
            .find(|scheme| scheme.matches(body))
    }

    /// Returns the first scheme recognizing `body` as a presentation,
    /// with the id to store it under.
    #[must_use]
    pub fn identify_presentation(&self, body: &Value) -> Option<(&dyn EventScheme, String)> {
        self.schemes
            .iter()
            .find_map(|scheme| scheme.presentation_id(body).map(|id| (&**scheme, id)))
    }

    /// Number of registered schemes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    /// Whether no scheme is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug)]
    struct CatchAll;

    impl EventScheme for CatchAll {
        fn name(&self) -> &'static str {
            "catch-all"
        }

        fn matches(&self, _body: &Value) -> bool {
            true
        }

        fn telemetry_point(&self, _ctx: &PointContext<'_>) -> Option<DataPoint> {
            None
        }

        fn fanout_event_type(&self) -> &'static str {
            "ANY"
        }
    }

    #[test]
    fn first_registered_match_wins() {
        let registry = SchemeRegistry::new(vec![Box::new(MattrScheme), Box::new(CatchAll)]);
        let mattr_body = json!({
            "event": { "id": "e", "type": "t", "timestamp": "2024-01-01T00:00:00Z" },
            "webhookId": "w",
            "deliveryId": "d",
            "deliveryTimestamp": "2024-01-01T00:00:01Z"
        });
        let Some(scheme) = registry.identify(&mattr_body) else {
            panic!("mattr body should match");
        };
        assert_eq!(scheme.name(), "mattr");

        let Some(scheme) = registry.identify(&json!({ "hello": "world" })) else {
            panic!("catch-all should match");
        };
        assert_eq!(scheme.name(), "catch-all");
    }

    #[test]
    fn builtin_ignores_unknown_shapes() {
        let registry = SchemeRegistry::builtin();
        assert!(registry.identify(&json!({ "hello": "world" })).is_none());
        assert!(registry.identify_presentation(&json!([1, 2])).is_none());
    }

    #[test]
    fn presentation_is_identified_by_challenge_id() {
        let registry = SchemeRegistry::builtin();
        let Some((scheme, id)) =
            registry.identify_presentation(&json!({ "challengeId": "abc", "verified": true }))
        else {
            panic!("presentation should match");
        };
        assert_eq!(scheme.name(), "mattr");
        assert_eq!(id, "abc");
    }
}
