//! Webhook channels and their per-channel policy.
//!
//! A [`Channel`] is created on registration and carries optional
//! [`ChannelMetadata`] toggling each relay step independently: response
//! deferral, signature verification, telemetry and fan-out.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ChannelId;
use crate::error::RelayError;
use crate::fanout::FanoutTarget;
use crate::signature::SignaturePolicy;
use crate::telemetry::TelemetryTarget;

/// Longest response deferral a channel may request.
pub const MAX_DEFER: Duration = Duration::from_millis(5000);

/// A registered webhook channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Channel identifier (UUID v4).
    pub id: ChannelId,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Optional relay policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChannelMetadata>,
}

impl Channel {
    /// Creates a channel with a fresh id.
    #[must_use]
    pub fn new(metadata: Option<ChannelMetadata>) -> Self {
        Self {
            id: ChannelId::generate(),
            created_at: Utc::now(),
            metadata,
        }
    }
}

/// Per-channel relay policy. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChannelMetadata {
    /// Delay before acknowledging an inbound event, at most 5 s.
    ///
    /// Accepts milliseconds (`1500`) or a string with a unit (`"2s"`,
    /// `"1500ms"`). Serialized as milliseconds.
    #[serde(default, with = "defer_duration", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<u64>, example = 2000)]
    pub defer: Option<Duration>,

    /// Signature verification policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignaturePolicy>,

    /// Time-series database receiving delivery-latency points.
    #[serde(default, alias = "influxdb", skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetryTarget>,

    /// Pub/sub backend receiving relayed events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fanout: Option<FanoutTarget>,
}

impl ChannelMetadata {
    /// Checks the bounds and formats the serde layer cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidMetadata`] describing the first problem.
    pub fn validate(&self) -> Result<(), RelayError> {
        if let Some(defer) = self.defer
            && defer > MAX_DEFER
        {
            return Err(RelayError::InvalidMetadata(format!(
                "defer must be at most {} ms, got {} ms",
                MAX_DEFER.as_millis(),
                defer.as_millis()
            )));
        }
        if let Some(signature) = &self.signature {
            signature.validate()?;
        }
        if let Some(telemetry) = &self.telemetry {
            telemetry.validate()?;
        }
        if let Some(fanout) = &self.fanout {
            fanout.validate()?;
        }
        Ok(())
    }

    /// Overlays the fields present in `patch` onto `self`.
    #[must_use]
    pub fn merge(self, patch: Self) -> Self {
        Self {
            defer: patch.defer.or(self.defer),
            signature: patch.signature.or(self.signature),
            telemetry: patch.telemetry.or(self.telemetry),
            fanout: patch.fanout.or(self.fanout),
        }
    }
}

/// Parses a deferral such as `"2s"`, `"1500ms"`, `"1.5s"` or `"250"`.
///
/// A bare number is milliseconds. Supported units are `ms`, `s` and `m`.
///
/// # Errors
///
/// Returns a description of why the value is not a duration.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration {raw:?}"))?;
    let scale = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "ms" | "msec" | "msecs" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        other => return Err(format!("unsupported duration unit {other:?}")),
    };
    let millis = value * scale;
    if !millis.is_finite() || millis < 0.0 {
        return Err(format!("invalid duration {raw:?}"));
    }
    Ok(Duration::from_secs_f64(millis / 1_000.0))
}

mod defer_duration {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Millis(ms)) => Ok(Some(Duration::from_millis(ms))),
            Some(Raw::Text(text)) => super::parse_duration(&text).map(Some).map_err(D::Error::custom),
        }
    }
}
