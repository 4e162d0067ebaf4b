//! Channel identifiers and the pub/sub topics derived from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Prefix of every channel topic. Subscribers treat `private-` topics as
/// requiring authorization.
pub const TOPIC_PREFIX: &str = "private-";

/// Random (v4) UUID naming a webhook channel.
///
/// It is the tail of the channel's callback URL, the suffix of its store
/// key and, behind [`TOPIC_PREFIX`], the topic its events are published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, format = Uuid)]
pub struct ChannelId(uuid::Uuid);

impl ChannelId {
    /// Generates a fresh id for a new channel.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Topic this channel's events are published on.
    #[must_use]
    pub fn topic(&self) -> String {
        format!("{TOPIC_PREFIX}{}", self.0)
    }

    /// Recovers the channel a topic belongs to.
    ///
    /// Returns `None` for topics that are not channel topics.
    #[must_use]
    pub fn from_topic(topic: &str) -> Option<Self> {
        topic.strip_prefix(TOPIC_PREFIX)?.parse().ok()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ChannelId {
    type Err = uuid::Error;

    /// Accepts any UUID form the `uuid` crate parses (hyphenated, simple,
    /// braced, URN).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<ChannelId> for uuid::Uuid {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn topic_round_trips() {
        let id = ChannelId::generate();
        assert_eq!(id.topic(), format!("private-{id}"));
        assert_eq!(ChannelId::from_topic(&id.topic()), Some(id));
        assert_eq!(ChannelId::from_topic(&id.to_string()), None);
        assert_eq!(ChannelId::from_topic("private-nope"), None);
    }

    #[test]
    fn simple_form_parses_to_the_same_channel() {
        let id = ChannelId::generate();
        let simple = uuid::Uuid::from(id).simple().to_string();
        let Ok(parsed) = simple.parse::<ChannelId>() else {
            panic!("simple uuid should parse");
        };
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ChannelId>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ChannelId::generate();
        let Ok(json) = serde_json::to_value(id) else {
            panic!("serialization failed");
        };
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }
}
