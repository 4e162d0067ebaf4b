//! Domain layer: channels, pooled client handles, and the local event system.
//!
//! This module contains the relay's core model: channel identity and
//! policy, the content-keyed resource pool that amortizes client creation
//! across requests, and the event shape delivered to subscribers.

pub mod channel;
pub mod channel_id;
pub mod fanout_event;
pub mod pool_key;
pub mod resource_pool;

pub use channel::{Channel, ChannelMetadata};
pub use channel_id::ChannelId;
pub use fanout_event::FanoutEvent;
pub use pool_key::PoolKey;
pub use resource_pool::{PoolFactory, ResourcePool};
