//! Service layer: business logic orchestration.
//!
//! [`RelayService`] ties the channel store, the signature verifier, the
//! event-scheme registry and the client pools together for each request.

pub mod relay_service;

pub use relay_service::{InboundEvent, RelayOutcome, RelayService};
