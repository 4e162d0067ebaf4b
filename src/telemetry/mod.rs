//! Delivery-latency telemetry.
//!
//! Event schemes turn an inbound webhook into a [`DataPoint`]; the relay
//! hands it to a pooled [`TelemetryWriter`] for the channel's
//! [`TelemetryTarget`]. Writers buffer points and flush them in batches,
//! so submitting never blocks a request.

pub mod influx;

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::ResourcePool;
use crate::error::RelayError;

pub use influx::{InfluxWriter, InfluxWriterFactory};

/// Pool of telemetry writers keyed by target.
pub type TelemetryPool = ResourcePool<TelemetryTarget, Arc<dyn TelemetryWriter>>;

/// A time-series database endpoint (InfluxDB v2 write API).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TelemetryTarget {
    /// Base URL, e.g. `http://influxdb:8086`.
    pub url: String,
    /// API token sent as `Authorization: Token <token>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Organization name.
    pub org: String,
    /// Destination bucket.
    pub bucket: String,
}

impl TelemetryTarget {
    /// Checks that the URL is an absolute `http(s)` URL.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidMetadata`] if it is not.
    pub fn validate(&self) -> Result<(), RelayError> {
        self.write_url().map(|_| ())
    }

    /// Builds the write endpoint URL for this target.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidMetadata`] for malformed or non-HTTP
    /// base URLs.
    pub fn write_url(&self) -> Result<reqwest::Url, RelayError> {
        let base = reqwest::Url::parse(&self.url)
            .map_err(|e| RelayError::InvalidMetadata(format!("telemetry url: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(RelayError::InvalidMetadata(format!(
                "telemetry url must be http(s): {}",
                self.url
            )));
        }
        reqwest::Url::parse_with_params(
            &format!("{}/api/v2/write", self.url.trim_end_matches('/')),
            &[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ms"),
            ],
        )
        .map_err(|e| RelayError::InvalidMetadata(format!("telemetry url: {e}")))
    }
}

/// One time-series point.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    /// Measurement name.
    pub measurement: String,
    /// Indexed tags.
    pub tags: BTreeMap<String, String>,
    /// Integer fields; a point without fields cannot be written.
    pub fields: BTreeMap<String, i64>,
    /// Timestamp in milliseconds since the epoch.
    pub timestamp_ms: i64,
}

impl DataPoint {
    /// Starts a point for `measurement` stamped with the current time.
    #[must_use]
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds an integer field.
    #[must_use]
    pub fn int_field(mut self, key: impl Into<String>, value: i64) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Encodes the point as one line of InfluxDB line protocol.
    ///
    /// Returns `None` for a point without fields. Line breaks in names and
    /// tag values are replaced by spaces, so the result is always a single
    /// line.
    #[must_use]
    pub fn to_line_protocol(&self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            let _ = write!(
                line,
                ",{}={}",
                escape(key, KEY_SPECIAL),
                escape(value, KEY_SPECIAL)
            );
        }
        let fields = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={value}i", escape(key, KEY_SPECIAL)))
            .collect::<Vec<_>>()
            .join(",");
        let _ = write!(line, " {fields} {}", self.timestamp_ms);
        Some(line)
    }
}

const KEY_SPECIAL: &[char] = &[',', '=', ' '];

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if matches!(c, '\n' | '\r') { ' ' } else { c };
        if special.contains(&c) || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A buffered sink for [`DataPoint`]s.
#[async_trait]
pub trait TelemetryWriter: Send + Sync + fmt::Debug {
    /// Queues a point for the next flush. Never blocks.
    fn submit(&self, point: DataPoint);

    /// Flushes buffered points and stops the writer.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Telemetry`] if the final flush fails.
    async fn close(&self) -> Result<(), RelayError>;
}
