//! Ed25519 JSON Web Keys (RFC 8037 `OKP` keys).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{KeyAlgorithm, SignatureError};

/// A trusted sender public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Jwk {
    /// Key type, must be `OKP`.
    pub kty: String,
    /// Curve, must be `Ed25519`.
    pub crv: String,
    /// Base64url-encoded 32-byte public key.
    pub x: String,
    /// Key id matched against the signature's key id.
    pub kid: String,
}

impl Jwk {
    /// Converts the JWK into a native verifying key.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidKey`] for non-Ed25519 keys or
    /// malformed key material.
    pub fn verifying_key(&self) -> Result<VerifyingKey, SignatureError> {
        if self.kty != "OKP" || self.crv != "Ed25519" {
            return Err(SignatureError::InvalidKey(format!(
                "unsupported key type {}/{}",
                self.kty, self.crv
            )));
        }
        let raw = URL_SAFE_NO_PAD
            .decode(self.x.trim_end_matches('='))
            .map_err(|e| SignatureError::InvalidKey(format!("x is not base64url: {e}")))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| SignatureError::InvalidKey("x must be 32 bytes".to_string()))?;
        VerifyingKey::from_bytes(&bytes).map_err(|e| SignatureError::InvalidKey(e.to_string()))
    }

    /// Algorithm implied by the key type.
    #[must_use]
    pub const fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Ed25519
    }

    /// Builds a JWK from a verifying key.
    #[must_use]
    pub fn from_verifying_key(kid: impl Into<String>, key: &VerifyingKey) -> Self {
        Self {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            x: URL_SAFE_NO_PAD.encode(key.as_bytes()),
            kid: kid.into(),
        }
    }
}

/// Finds the trusted key with the given id.
///
/// # Errors
///
/// Returns [`SignatureError::UnknownKey`] if no key matches.
pub fn find_key<'a>(jwks: &'a [Jwk], kid: &str) -> Result<&'a Jwk, SignatureError> {
    jwks.iter()
        .find(|key| key.kid == kid)
        .ok_or_else(|| SignatureError::UnknownKey(kid.to_string()))
}

/// Resolves the algorithm to verify with.
///
/// `None` and the legacy `hs2019` marker mean "infer from the key".
///
/// # Errors
///
/// Returns [`SignatureError::UnsupportedAlgorithm`] when the declared
/// algorithm does not fit the key.
pub fn resolve_algorithm(declared: Option<&str>, key: &Jwk) -> Result<KeyAlgorithm, SignatureError> {
    match declared.map(str::to_ascii_lowercase).as_deref() {
        None | Some("hs2019") => Ok(key.algorithm()),
        Some("ed25519") | Some("ed25519-sha512") => Ok(KeyAlgorithm::Ed25519),
        Some(other) => Err(SignatureError::UnsupportedAlgorithm(other.to_string())),
    }
}
