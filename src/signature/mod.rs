//! HTTP message-signature verification.
//!
//! [`verify`] checks an inbound request against a channel's
//! [`SignaturePolicy`] and always returns a [`VerificationResult`]: a
//! signature that cannot be parsed, refers to an unknown key, uses an
//! unsupported algorithm or simply does not match is a normal, reportable
//! outcome, never an error.
//!
//! Two mutually incompatible conventions are supported, selected by
//! [`SignatureSchemeId`]:
//!
//! - [`cavage`]: the legacy `Authorization: Signature keyId=...` format
//!   (draft-cavage-http-signatures). Used for absent or unknown scheme ids.
//! - [`httpbis`]: the IETF draft `Signature-Input` / `Signature` structured
//!   field format.
//!
//! Only Ed25519 keys supplied as JSON Web Keys are supported.

pub mod cavage;
pub mod digest;
pub mod httpbis;
pub mod jwk;
mod request;
mod structured;

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::RelayError;

pub use jwk::Jwk;
pub use request::SignedRequest;

/// Identifier of an HTTP signature convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureSchemeId {
    /// Legacy draft-cavage `Authorization: Signature` header.
    #[default]
    Cavage,
    /// IETF HTTP message signatures draft.
    Httpbis,
    /// IETF HTTP message signatures draft revision 11.
    #[serde(rename = "httpbis-11")]
    Httpbis11,
    /// Any identifier the relay does not know; verified as [`Self::Cavage`].
    #[serde(other)]
    Unknown,
}

/// Signature verification policy attached to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignaturePolicy {
    /// HTTP signature scheme. Absent means the legacy scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<SignatureSchemeId>,

    /// Trusted sender public keys in JWK format.
    pub jwks: Vec<Jwk>,

    /// Header carrying the legacy signature, `authorization` by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_header_name: Option<String>,
}

impl SignaturePolicy {
    /// Checks that every trusted key is a usable Ed25519 JWK.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidMetadata`] naming the first bad key.
    pub fn validate(&self) -> Result<(), RelayError> {
        for key in &self.jwks {
            key.verifying_key()
                .map_err(|e| RelayError::InvalidMetadata(format!("jwks[{}]: {e}", key.kid)))?;
        }
        if let Some(name) = &self.authorization_header_name
            && axum::http::HeaderName::from_bytes(name.as_bytes()).is_err()
        {
            return Err(RelayError::InvalidMetadata(format!(
                "invalid authorization header name: {name}"
            )));
        }
        Ok(())
    }

    /// Returns the scheme used to verify requests under this policy.
    #[must_use]
    pub fn effective_scheme(&self) -> SignatureSchemeId {
        match self.scheme {
            None | Some(SignatureSchemeId::Unknown) => SignatureSchemeId::Cavage,
            Some(scheme) => scheme,
        }
    }
}

/// Outcome of a signature check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VerificationResult {
    /// Whether the request is authentic under the policy.
    pub verified: bool,

    /// Human-readable reason for a failed verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Signature parameters that were successfully parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<BTreeMap<String, String>>,
}

impl VerificationResult {
    /// A successful verification.
    #[must_use]
    pub fn verified(parsed: BTreeMap<String, String>) -> Self {
        Self {
            verified: true,
            reason: None,
            parsed: Some(parsed),
        }
    }

    /// A failed verification.
    #[must_use]
    pub fn rejected(reason: impl ToString, parsed: Option<BTreeMap<String, String>>) -> Self {
        Self {
            verified: false,
            reason: Some(reason.to_string()),
            parsed,
        }
    }
}

/// Tunables shared by every scheme.
#[derive(Debug, Clone, Copy)]
pub struct VerifyOptions {
    /// Maximum distance between a signed `date` header and the local clock.
    pub clock_skew: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            clock_skew: Duration::from_secs(300),
        }
    }
}

impl VerifyOptions {
    /// Sets the accepted clock skew.
    #[must_use]
    pub const fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }
}

/// Reasons a signature could not be verified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// A required header is absent.
    #[error("missing {0} header")]
    MissingHeader(String),

    /// A signature header could not be parsed.
    #[error("malformed signature: {0}")]
    Malformed(String),

    /// The key id is not among the trusted keys.
    #[error("no public key found with kid={0}")]
    UnknownKey(String),

    /// A trusted key could not be converted into a verifying key.
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    /// The declared algorithm is not supported for the key.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A covered component cannot be reproduced.
    #[error("unsupported component: {0}")]
    UnsupportedComponent(String),

    /// The signature's `expires` parameter lies in the past.
    #[error("signature expired")]
    Expired,

    /// The signed `date` header is too far from the local clock.
    #[error("date header outside allowed clock skew")]
    ClockSkew,

    /// A body digest header does not match the body.
    #[error("digest mismatch: {0}")]
    DigestMismatch(String),

    /// The signature bytes do not verify against the signature base.
    #[error("invalid signature")]
    InvalidSignature,
}

/// Key algorithms the relay can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// Ed25519 (EdDSA over Curve25519 with SHA-512).
    Ed25519,
}

/// Verifies `request` against `policy` at the current time.
#[must_use]
pub fn verify(
    request: &SignedRequest,
    policy: &SignaturePolicy,
    options: &VerifyOptions,
) -> VerificationResult {
    verify_at(request, policy, options, Utc::now())
}

/// Verifies `request` against `policy` as if the local clock read `now`.
#[must_use]
pub fn verify_at(
    request: &SignedRequest,
    policy: &SignaturePolicy,
    options: &VerifyOptions,
    now: DateTime<Utc>,
) -> VerificationResult {
    let result = match policy.effective_scheme() {
        SignatureSchemeId::Httpbis | SignatureSchemeId::Httpbis11 => {
            httpbis::verify(request, policy, options, now)
        }
        SignatureSchemeId::Cavage | SignatureSchemeId::Unknown => {
            cavage::verify(request, policy, options, now)
        }
    };
    tracing::debug!(
        scheme = ?policy.effective_scheme(),
        verified = result.verified,
        reason = result.reason.as_deref().unwrap_or_default(),
        "signature checked"
    );
    result
}
