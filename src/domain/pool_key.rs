//! Content-derived keys for pooled client handles.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::RelayError;

/// SHA-256 digest over the canonical JSON encoding of a configuration value.
///
/// The value is first converted to a [`serde_json::Value`], whose object
/// maps are ordered by key, so two deeply equal configurations always
/// encode to the same bytes regardless of how they were built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey([u8; 32]);

impl PoolKey {
    /// Derives the key for a configuration value.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] if the value cannot be represented
    /// as JSON (e.g. a map with non-string keys).
    pub fn derive<C: Serialize + ?Sized>(config: &C) -> Result<Self, RelayError> {
        let canonical = serde_json::to_value(config)
            .and_then(|value| serde_json::to_vec(&value))
            .map_err(|e| RelayError::Internal(format!("unhashable pool config: {e}")))?;
        Ok(Self(Sha256::digest(&canonical).into()))
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&STANDARD.encode(self.0))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn key<C: Serialize>(config: &C) -> PoolKey {
        let Ok(key) = PoolKey::derive(config) else {
            panic!("config should hash");
        };
        key
    }

    #[test]
    fn deeply_equal_values_share_a_key() {
        let a = json!({ "url": "http://influx:8086", "org": "acme", "bucket": "hooks" });
        let b = json!({ "bucket": "hooks", "org": "acme", "url": "http://influx:8086" });
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn hash_map_iteration_order_does_not_matter() {
        let mut a = HashMap::new();
        let mut b = HashMap::new();
        for i in 0..32 {
            a.insert(format!("k{i}"), i);
        }
        for i in (0..32).rev() {
            b.insert(format!("k{i}"), i);
        }
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn distinct_values_differ() {
        let a = json!({ "url": "redis://a" });
        let b = json!({ "url": "redis://b" });
        assert_ne!(key(&a), key(&b));
    }

    #[test]
    fn display_is_base64_digest() {
        let k = key(&json!("x"));
        assert_eq!(k.to_string().len(), 44);
    }
}
