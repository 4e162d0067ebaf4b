//! Legacy HTTP signatures (draft-cavage-http-signatures).
//!
//! The signature travels in a single header, `Authorization` by default:
//!
//! ```text
//! Authorization: Signature keyId="key-1",algorithm="hs2019",
//!   headers="(request-target) host date digest",signature="<base64>"
//! ```
//!
//! The signing string has one `name: value` line per entry in `headers`,
//! in order, joined with `\n`.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier};

use super::digest::verify_digest_header;
use super::jwk::{find_key, resolve_algorithm};
use super::{
    KeyAlgorithm, SignatureError, SignaturePolicy, SignedRequest, VerificationResult,
    VerifyOptions,
};

/// Header read when the policy does not name another one.
pub const DEFAULT_HEADER: &str = "authorization";

/// Parameters of a legacy signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    /// Key identifier.
    pub key_id: String,
    /// Declared algorithm; `hs2019` means "infer from the key".
    pub algorithm: String,
    /// Covered header names, lowercased, in signing order.
    pub headers: Vec<String>,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
    /// `(created)` value, seconds since the epoch.
    pub created: Option<i64>,
    /// `(expires)` value, seconds since the epoch.
    pub expires: Option<i64>,
}

impl SignatureParams {
    fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("keyId".to_string(), self.key_id.clone());
        map.insert("algorithm".to_string(), self.algorithm.clone());
        map.insert("headers".to_string(), self.headers.join(" "));
        if let Some(created) = self.created {
            map.insert("created".to_string(), created.to_string());
        }
        if let Some(expires) = self.expires {
            map.insert("expires".to_string(), expires.to_string());
        }
        map
    }
}

/// Verifies a legacy signature.
#[must_use]
pub fn verify(
    request: &SignedRequest,
    policy: &SignaturePolicy,
    options: &VerifyOptions,
    now: DateTime<Utc>,
) -> VerificationResult {
    let header_name = policy
        .authorization_header_name
        .as_deref()
        .unwrap_or(DEFAULT_HEADER)
        .to_ascii_lowercase();

    let Some(value) = request.header(&header_name) else {
        return VerificationResult::rejected(SignatureError::MissingHeader(header_name), None);
    };
    let params = match parse_header(&value) {
        Ok(params) => params,
        Err(err) => return VerificationResult::rejected(err, None),
    };
    let parsed = params.to_map();

    match check(request, policy, options, now, &params) {
        Ok(()) => VerificationResult::verified(parsed),
        Err(err) => VerificationResult::rejected(err, Some(parsed)),
    }
}

fn check(
    request: &SignedRequest,
    policy: &SignaturePolicy,
    options: &VerifyOptions,
    now: DateTime<Utc>,
    params: &SignatureParams,
) -> Result<(), SignatureError> {
    let jwk = find_key(&policy.jwks, &params.key_id)?;
    let key = jwk.verifying_key()?;
    let algorithm = resolve_algorithm(Some(&params.algorithm), jwk)?;

    if let Some(expires) = params.expires
        && expires < now.timestamp()
    {
        return Err(SignatureError::Expired);
    }
    if params.headers.iter().any(|h| h == "date")
        && let Some(date) = request.header("date")
    {
        let signed_at = DateTime::parse_from_rfc2822(&date)
            .map_err(|_| SignatureError::Malformed(format!("date header {date:?}")))?;
        let skew = (now.timestamp() - signed_at.timestamp()).unsigned_abs();
        if skew > options.clock_skew.as_secs() {
            return Err(SignatureError::ClockSkew);
        }
    }
    if params.headers.iter().any(|h| h == "digest") {
        let digest = request
            .header("digest")
            .ok_or_else(|| SignatureError::MissingHeader("digest".to_string()))?;
        verify_digest_header(&digest, request.body())?;
    }

    let signing_string = signing_string(request, params)?;
    match algorithm {
        KeyAlgorithm::Ed25519 => {
            let signature = Signature::from_slice(&params.signature)
                .map_err(|_| SignatureError::Malformed("signature must be 64 bytes".to_string()))?;
            key.verify(signing_string.as_bytes(), &signature)
                .map_err(|_| SignatureError::InvalidSignature)
        }
    }
}

/// Builds the string the sender signed.
///
/// # Errors
///
/// Returns [`SignatureError::MissingHeader`] if a covered header is absent.
pub fn signing_string(
    request: &SignedRequest,
    params: &SignatureParams,
) -> Result<String, SignatureError> {
    let mut lines = Vec::with_capacity(params.headers.len());
    for name in &params.headers {
        let line = match name.as_str() {
            "(request-target)" => format!(
                "(request-target): {} {}",
                request.method().as_str().to_ascii_lowercase(),
                request.path_and_query()
            ),
            "(created)" => {
                let created = params
                    .created
                    .ok_or_else(|| SignatureError::Malformed("missing created".to_string()))?;
                format!("(created): {created}")
            }
            "(expires)" => {
                let expires = params
                    .expires
                    .ok_or_else(|| SignatureError::Malformed("missing expires".to_string()))?;
                format!("(expires): {expires}")
            }
            "host" => {
                let host = request
                    .header("host")
                    .unwrap_or_else(|| request.authority().to_string());
                format!("host: {host}")
            }
            header => {
                let value = request
                    .header(header)
                    .ok_or_else(|| SignatureError::MissingHeader(header.to_string()))?;
                format!("{header}: {value}")
            }
        };
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

/// Parses a legacy signature header value.
///
/// A leading `Signature` auth-scheme token is optional.
///
/// # Errors
///
/// Returns [`SignatureError::Malformed`] on syntax errors or missing
/// `keyId` / `signature` parameters.
pub fn parse_header(value: &str) -> Result<SignatureParams, SignatureError> {
    let mut rest = value.trim();
    if let Some(prefix) = rest.get(..10)
        && prefix.eq_ignore_ascii_case("signature ")
    {
        rest = rest.get(10..).unwrap_or_default().trim_start();
    }

    let pairs = parse_pairs(rest)?;
    let get = |name: &str| pairs.get(name).cloned();

    let key_id = get("keyId").ok_or_else(|| SignatureError::Malformed("missing keyId".to_string()))?;
    let encoded =
        get("signature").ok_or_else(|| SignatureError::Malformed("missing signature".to_string()))?;
    let signature = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|_| SignatureError::Malformed("signature is not base64".to_string()))?;

    let headers = get("headers")
        .unwrap_or_else(|| "date".to_string())
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>();
    if headers.is_empty() {
        return Err(SignatureError::Malformed("empty headers list".to_string()));
    }

    let parse_time = |name: &str| -> Result<Option<i64>, SignatureError> {
        get(name)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| SignatureError::Malformed(format!("{name} is not an integer")))
            })
            .transpose()
    };

    Ok(SignatureParams {
        key_id,
        algorithm: get("algorithm").unwrap_or_else(|| "hs2019".to_string()),
        headers,
        signature,
        created: parse_time("created")?,
        expires: parse_time("expires")?,
    })
}

/// Splits `name="value",name=value` pairs. Later duplicates win.
fn parse_pairs(input: &str) -> Result<BTreeMap<String, String>, SignatureError> {
    let mut pairs = BTreeMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ',') {
            name.push(c);
        }
        let name = name.trim().to_string();
        if name.is_empty() || chars.next() != Some('=') {
            return Err(SignatureError::Malformed(format!(
                "expected name=value near {name:?}"
            )));
        }

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    Some(c) => value.push(c),
                    None => {
                        return Err(SignatureError::Malformed(format!(
                            "unterminated value for {name}"
                        )));
                    }
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                value.push(c);
            }
            value = value.trim().to_string();
        }
        pairs.insert(name, value);
    }

    Ok(pairs)
}
