//! # webhook-relay
//!
//! Receives webhook callbacks on per-channel URLs, verifies their HTTP
//! message signatures, forwards them to pub/sub subscribers and records
//! delivery-latency telemetry.
//!
//! Every inbound webhook is acknowledged with `200 {"status":"Ok"}`
//! regardless of what the relay did with it, so senders cannot probe
//! channels or signature policies.
//!
//! ## Architecture
//!
//! ```text
//! Webhook senders, channel owners, WebSocket subscribers
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── RelayService (service/)
//!     │     ├── signature verification (signature/)
//!     │     ├── event schemes (scheme/)
//!     │     ├── telemetry writer pool (telemetry/)
//!     │     └── fan-out publisher pool (fanout/)
//!     │
//!     └── Channel and presentation records (store/: Redis or memory)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod fanout;
pub mod scheme;
pub mod service;
pub mod signature;
pub mod store;
pub mod telemetry;
pub mod ws;
