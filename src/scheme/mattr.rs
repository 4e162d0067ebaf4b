//! MATTR platform webhooks.
//!
//! Events look like:
//!
//! ```json
//! {
//!   "event": { "id": "...", "type": "OpenIdCredentialIssued", "timestamp": "2024-01-01T00:00:00Z" },
//!   "webhookId": "...",
//!   "deliveryId": "...",
//!   "deliveryTimestamp": "2024-01-01T00:00:01Z"
//! }
//! ```
//!
//! Presentation callbacks carry a `challengeId` and a `verified` flag.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{EventScheme, PointContext};
use crate::telemetry::DataPoint;

/// Measurement name for delivery-latency points.
pub const MEASUREMENT: &str = "webhook_event";

/// Fan-out label for MATTR events.
pub const EVENT_TYPE: &str = "WEBHOOK_MATTR_EVENT";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    event: EventInfo,
    webhook_id: String,
    #[allow(dead_code)]
    delivery_id: String,
    delivery_timestamp: String,
}

#[derive(Debug, Deserialize)]
struct EventInfo {
    #[allow(dead_code)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Presentation {
    challenge_id: String,
    #[allow(dead_code)]
    verified: bool,
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// The MATTR webhook scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct MattrScheme;

impl EventScheme for MattrScheme {
    fn name(&self) -> &'static str {
        "mattr"
    }

    fn matches(&self, body: &Value) -> bool {
        WebhookEvent::deserialize(body).is_ok()
    }

    fn telemetry_point(&self, ctx: &PointContext<'_>) -> Option<DataPoint> {
        let body = WebhookEvent::deserialize(ctx.body).ok()?;
        let event_at = parse_time(&body.event.timestamp)?;
        let delivered_at = parse_time(&body.delivery_timestamp)?;
        let arrived_at = ctx.received_at;

        // event_lag_ms excludes the delivery request itself.
        Some(
            DataPoint::new(MEASUREMENT)
                .tag("channel", ctx.channel_id.to_string())
                .tag("webhook_id", body.webhook_id)
                .tag("event_type", body.event.kind)
                .int_field("event_lag_ms", (delivered_at - event_at).num_milliseconds())
                .int_field("event_arrival_lag_ms", (arrived_at - event_at).num_milliseconds())
                .int_field("delivery_lag_ms", (arrived_at - delivered_at).num_milliseconds())
                .timestamp_ms(arrived_at.timestamp_millis()),
        )
    }

    fn fanout_event_type(&self) -> &'static str {
        EVENT_TYPE
    }

    fn presentation_id(&self, body: &Value) -> Option<String> {
        Presentation::deserialize(body).ok().map(|p| p.challenge_id)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::ChannelId;

    fn event_body() -> Value {
        json!({
            "event": {
                "id": "evt-1",
                "type": "OpenIdCredentialIssued",
                "timestamp": "2024-05-01T10:00:00.000Z"
            },
            "webhookId": "hook-1",
            "deliveryId": "del-1",
            "deliveryTimestamp": "2024-05-01T10:00:00.250Z"
        })
    }

    #[test]
    fn matches_only_complete_events() {
        assert!(MattrScheme.matches(&event_body()));
        let mut partial = event_body();
        if let Some(obj) = partial.as_object_mut() {
            obj.remove("deliveryId");
        }
        assert!(!MattrScheme.matches(&partial));
        assert!(!MattrScheme.matches(&json!("string body")));
    }

    #[test]
    fn builds_latency_point() {
        let body = event_body();
        let Ok(received_at) = DateTime::parse_from_rfc3339("2024-05-01T10:00:01.000Z") else {
            panic!("valid time");
        };
        let channel_id = ChannelId::generate();
        let ctx = PointContext {
            channel_id,
            body: &body,
            received_at: received_at.with_timezone(&Utc),
        };
        let Some(point) = MattrScheme.telemetry_point(&ctx) else {
            panic!("point expected");
        };
        assert_eq!(point.measurement, MEASUREMENT);
        assert_eq!(point.tags.get("channel"), Some(&channel_id.to_string()));
        assert_eq!(point.tags.get("webhook_id").map(String::as_str), Some("hook-1"));
        assert_eq!(
            point.tags.get("event_type").map(String::as_str),
            Some("OpenIdCredentialIssued")
        );
        assert_eq!(point.fields.get("event_lag_ms"), Some(&250));
        assert_eq!(point.fields.get("event_arrival_lag_ms"), Some(&1000));
        assert_eq!(point.fields.get("delivery_lag_ms"), Some(&750));
        assert_eq!(point.timestamp_ms, ctx.received_at.timestamp_millis());
    }

    #[test]
    fn unparsable_timestamp_yields_no_point() {
        let mut body = event_body();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("deliveryTimestamp".to_string(), json!("yesterday"));
        }
        let ctx = PointContext {
            channel_id: ChannelId::generate(),
            body: &body,
            received_at: Utc::now(),
        };
        assert!(MattrScheme.telemetry_point(&ctx).is_none());
    }

    #[test]
    fn presentation_requires_verified_flag() {
        assert_eq!(
            MattrScheme.presentation_id(&json!({ "challengeId": "c1", "verified": false })),
            Some("c1".to_string())
        );
        assert!(MattrScheme.presentation_id(&json!({ "challengeId": "c1" })).is_none());
    }
}
