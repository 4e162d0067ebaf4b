//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::time::Duration;

/// Default ingress body limit (16 MiB).
pub const DEFAULT_INGRESS_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Public base URL used to build channel callback URLs. When unset, the
    /// request `Host` header is used.
    pub public_url: Option<String>,

    /// Redis connection string. When unset, an in-memory store is used.
    pub redis_url: Option<String>,

    /// Prefix prepended to every key written to the store.
    pub redis_key_prefix: String,

    /// Sliding expiration of channel records, in seconds.
    pub channel_ttl_secs: u64,

    /// Fixed expiration of presentation records, in seconds.
    pub presentation_ttl_secs: u64,

    /// Idle age after which pooled client handles are released.
    pub pool_max_age: Duration,

    /// Interval between background pool sweeps.
    pub pool_sweep_interval: Duration,

    /// Interval between purges of expired in-memory store keys.
    pub store_purge_interval: Duration,

    /// Largest webhook body the ingress reads; larger bodies are
    /// acknowledged and dropped.
    pub ingress_body_limit: usize,

    /// Capacity of the local fan-out broadcast channel.
    pub local_bus_capacity: usize,

    /// Maximum accepted clock skew for signed `date` headers, in seconds.
    pub signature_clock_skew_secs: u64,

    /// Upper bound on the time spent serving a single request.
    pub request_timeout: Duration,

    /// Delay between telemetry buffer flushes.
    pub telemetry_flush_interval: Duration,

    /// Socket timeout for telemetry writes.
    pub telemetry_http_timeout: Duration,

    /// Log formatter.
    pub log_format: LogFormat,
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        let public_url = parse_env_opt("PUBLIC_URL").map(|url| url.trim_end_matches('/').to_string());
        let redis_url = parse_env_opt("REDIS_URL");
        let redis_key_prefix =
            std::env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "webhook-relay:".to_string());

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            public_url,
            redis_url,
            redis_key_prefix,
            channel_ttl_secs: parse_env("CHANNEL_TTL_SECS", 3600 * 120),
            presentation_ttl_secs: parse_env("PRESENTATION_TTL_SECS", 300),
            pool_max_age: Duration::from_secs(parse_env("POOL_MAX_AGE_SECS", 30)),
            pool_sweep_interval: Duration::from_secs(parse_env("POOL_SWEEP_INTERVAL_SECS", 10)),
            store_purge_interval: Duration::from_secs(parse_env("STORE_PURGE_INTERVAL_SECS", 60)),
            ingress_body_limit: parse_env("INGRESS_BODY_LIMIT_BYTES", DEFAULT_INGRESS_BODY_LIMIT),
            local_bus_capacity: parse_env("LOCAL_BUS_CAPACITY", 10_000),
            signature_clock_skew_secs: parse_env("SIGNATURE_CLOCK_SKEW_SECS", 300),
            request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", 30)),
            telemetry_flush_interval: Duration::from_millis(parse_env(
                "TELEMETRY_FLUSH_INTERVAL_MS",
                5000,
            )),
            telemetry_http_timeout: Duration::from_millis(parse_env(
                "TELEMETRY_HTTP_TIMEOUT_MS",
                5000,
            )),
            log_format,
        })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            public_url: None,
            redis_url: None,
            redis_key_prefix: "webhook-relay:".to_string(),
            channel_ttl_secs: 3600 * 120,
            presentation_ttl_secs: 300,
            pool_max_age: Duration::from_secs(30),
            pool_sweep_interval: Duration::from_secs(10),
            store_purge_interval: Duration::from_secs(60),
            ingress_body_limit: DEFAULT_INGRESS_BODY_LIMIT,
            local_bus_capacity: 10_000,
            signature_clock_skew_secs: 300,
            request_timeout: Duration::from_secs(30),
            telemetry_flush_interval: Duration::from_millis(5000),
            telemetry_http_timeout: Duration::from_millis(5000),
            log_format: LogFormat::Text,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Reads an environment variable, treating empty values as unset.
fn parse_env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RelayConfig::default();
        assert_eq!(config.channel_ttl_secs, 432_000);
        assert_eq!(config.presentation_ttl_secs, 300);
        assert_eq!(config.pool_max_age, Duration::from_secs(30));
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn parse_env_falls_back_on_missing_key() {
        let value: u64 = parse_env("WEBHOOK_RELAY_TEST_UNSET_KEY", 42);
        assert_eq!(value, 42);
    }
}
