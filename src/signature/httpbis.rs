//! IETF HTTP message signatures (`Signature-Input` / `Signature`).
//!
//! ```text
//! Signature-Input: sig1=("@method" "@authority" "@path" "content-digest");
//!   created=1618884473;keyid="key-1";alg="ed25519"
//! Signature: sig1=:<base64>:
//! ```
//!
//! The first label present in both headers is verified. The signature base
//! has one `"<component>": <value>` line per covered component followed by
//! the `"@signature-params"` line.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier};

use super::digest::verify_content_digest;
use super::jwk::{find_key, resolve_algorithm};
use super::structured::{self, BareItem, Item, Member, Params};
use super::{
    KeyAlgorithm, SignatureError, SignaturePolicy, SignedRequest, VerificationResult,
    VerifyOptions,
};

const SUPPORTED_DIGESTS: [&str; 2] = ["sha-256", "sha-512"];

struct Selected {
    label: String,
    components: Vec<Item>,
    params: Params,
    signature: Vec<u8>,
}

impl Selected {
    fn param_str(&self, name: &str) -> Option<&str> {
        match structured::param(&self.params, name) {
            Some(BareItem::String(s) | BareItem::Token(s)) => Some(s),
            _ => None,
        }
    }

    fn param_int(&self, name: &str) -> Option<i64> {
        match structured::param(&self.params, name) {
            Some(BareItem::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("label".to_string(), self.label.clone());
        map.insert(
            "components".to_string(),
            self.components
                .iter()
                .map(|item| item.bare.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        );
        for (key, value) in &self.params {
            let value = match value {
                BareItem::String(s) | BareItem::Token(s) => s.clone(),
                other => other.to_string(),
            };
            map.insert(key.clone(), value);
        }
        map
    }
}

/// Verifies an HTTP message signature.
#[must_use]
pub fn verify(
    request: &SignedRequest,
    policy: &SignaturePolicy,
    options: &VerifyOptions,
    now: DateTime<Utc>,
) -> VerificationResult {
    let selected = match select(request) {
        Ok(selected) => selected,
        Err(err) => return VerificationResult::rejected(err, None),
    };
    let parsed = selected.to_map();
    match check(request, policy, options, now, &selected) {
        Ok(()) => VerificationResult::verified(parsed),
        Err(err) => VerificationResult::rejected(err, Some(parsed)),
    }
}

fn select(request: &SignedRequest) -> Result<Selected, SignatureError> {
    let input = request
        .header("signature-input")
        .ok_or_else(|| SignatureError::MissingHeader("signature-input".to_string()))?;
    let signature = request
        .header("signature")
        .ok_or_else(|| SignatureError::MissingHeader("signature".to_string()))?;

    let inputs = structured::parse_dictionary(&input)?;
    let signatures = structured::parse_dictionary(&signature)?;

    inputs
        .into_iter()
        .find_map(|(label, member)| {
            let Member::InnerList(components, params) = member else {
                return None;
            };
            let bytes = signatures.iter().find_map(|(name, sig)| match sig {
                Member::Item(Item {
                    bare: BareItem::ByteSeq(bytes),
                    ..
                }) if *name == label => Some(bytes.clone()),
                _ => None,
            })?;
            Some(Selected {
                label,
                components,
                params,
                signature: bytes,
            })
        })
        .ok_or_else(|| SignatureError::Malformed("no matching signature label".to_string()))
}

fn check(
    request: &SignedRequest,
    policy: &SignaturePolicy,
    options: &VerifyOptions,
    now: DateTime<Utc>,
    selected: &Selected,
) -> Result<(), SignatureError> {
    let key_id = selected
        .param_str("keyid")
        .ok_or_else(|| SignatureError::Malformed("missing keyid".to_string()))?;
    let jwk = find_key(&policy.jwks, key_id)?;
    let key = jwk.verifying_key()?;
    let algorithm = resolve_algorithm(selected.param_str("alg"), jwk)?;

    if let Some(expires) = selected.param_int("expires")
        && expires < now.timestamp()
    {
        return Err(SignatureError::Expired);
    }
    if let Some(created) = selected.param_int("created")
        && created - now.timestamp() > i64::try_from(options.clock_skew.as_secs()).unwrap_or(i64::MAX)
    {
        return Err(SignatureError::ClockSkew);
    }

    let base = build_base(request, &selected.components, &selected.params)?;

    if selected
        .components
        .iter()
        .any(|item| item.bare == BareItem::String("content-digest".to_string()))
    {
        check_content_digest(request)?;
    }

    match algorithm {
        KeyAlgorithm::Ed25519 => {
            let signature = Signature::from_slice(&selected.signature)
                .map_err(|_| SignatureError::Malformed("signature must be 64 bytes".to_string()))?;
            key.verify(base.as_bytes(), &signature)
                .map_err(|_| SignatureError::InvalidSignature)
        }
    }
}

fn check_content_digest(request: &SignedRequest) -> Result<(), SignatureError> {
    let header = request
        .header("content-digest")
        .ok_or_else(|| SignatureError::MissingHeader("content-digest".to_string()))?;
    let mut checked = 0;
    for (algorithm, member) in structured::parse_dictionary(&header)? {
        if !SUPPORTED_DIGESTS.contains(&algorithm.as_str()) {
            continue;
        }
        let Member::Item(Item {
            bare: BareItem::ByteSeq(expected),
            ..
        }) = member
        else {
            return Err(SignatureError::Malformed(format!(
                "content-digest {algorithm} is not a byte sequence"
            )));
        };
        verify_content_digest(&algorithm, &expected, request.body())?;
        checked += 1;
    }
    if checked == 0 {
        return Err(SignatureError::DigestMismatch(
            "no supported digest algorithm".to_string(),
        ));
    }
    Ok(())
}

/// Builds the signature base for a `Signature-Input` member value such as
/// `("@method" "@path");created=1618884473;keyid="key-1"`.
///
/// # Errors
///
/// Returns [`SignatureError::Malformed`] if `covered` is not an inner list,
/// [`SignatureError::UnsupportedComponent`] for components that cannot be
/// reproduced and [`SignatureError::MissingHeader`] for absent headers.
pub fn signature_base(request: &SignedRequest, covered: &str) -> Result<String, SignatureError> {
    let dict = structured::parse_dictionary(&format!("sig={covered}"))?;
    match dict.into_iter().next() {
        Some((_, Member::InnerList(components, params))) => {
            build_base(request, &components, &params)
        }
        _ => Err(SignatureError::Malformed(
            "covered components must be an inner list".to_string(),
        )),
    }
}

fn build_base(
    request: &SignedRequest,
    components: &[Item],
    params: &Params,
) -> Result<String, SignatureError> {
    let mut lines = Vec::with_capacity(components.len() + 1);
    for item in components {
        let BareItem::String(name) = &item.bare else {
            return Err(SignatureError::Malformed(format!(
                "component {} is not a string",
                item.bare
            )));
        };
        if !item.params.is_empty() {
            return Err(SignatureError::UnsupportedComponent(format!(
                "{}{}",
                item.bare,
                structured::serialize_params(&item.params)
            )));
        }
        let value = component_value(request, name)?;
        lines.push(format!("\"{name}\": {value}"));
    }
    lines.push(format!(
        "\"@signature-params\": {}",
        structured::serialize_inner_list(components, params)
    ));
    Ok(lines.join("\n"))
}

fn component_value(request: &SignedRequest, name: &str) -> Result<String, SignatureError> {
    Ok(match name {
        "@method" => request.method().as_str().to_string(),
        "@target-uri" => request.target_uri(),
        "@authority" => request.authority().to_string(),
        "@scheme" => request.scheme().to_string(),
        "@request-target" => request.path_and_query(),
        "@path" => request.path().to_string(),
        "@query" => format!("?{}", request.query().unwrap_or_default()),
        derived if derived.starts_with('@') => {
            return Err(SignatureError::UnsupportedComponent(derived.to_string()));
        }
        header => request
            .header(header)
            .ok_or_else(|| SignatureError::MissingHeader(header.to_string()))?,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::body::Bytes;
    use axum::http::{HeaderMap, HeaderValue, Method, Uri};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use ed25519_dalek::{Signer, SigningKey};
    use sha2::{Digest, Sha256};

    use super::*;
    use crate::signature::{Jwk, SignatureSchemeId};

    const BODY: &[u8] = br#"{"event":{"id":"1"}}"#;
    const NOW: i64 = 1_700_000_000;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[9u8; 32])
    }

    fn policy() -> SignaturePolicy {
        SignaturePolicy {
            scheme: Some(SignatureSchemeId::Httpbis),
            jwks: vec![Jwk::from_verifying_key(
                "test-key-ed25519",
                &signing_key().verifying_key(),
            )],
            authorization_header_name: None,
        }
    }

    fn now() -> DateTime<Utc> {
        let Some(now) = DateTime::from_timestamp(NOW, 0) else {
            panic!("valid timestamp");
        };
        now
    }

    fn header(value: &str) -> HeaderValue {
        let Ok(value) = HeaderValue::from_str(value) else {
            panic!("valid header value {value}");
        };
        value
    }

    fn signed_request(covered: &str, body: &'static [u8], tamper: bool) -> SignedRequest {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("relay.example.com"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert(
            "content-digest",
            header(&format!("sha-256=:{}:", STANDARD.encode(Sha256::digest(BODY)))),
        );
        let uri: Uri = "/api/v1/webhook/events/abc?x=1".parse().unwrap_or_default();

        let unsigned = SignedRequest::new(Method::POST, &uri, headers.clone(), Bytes::from_static(body));
        let Ok(base) = signature_base(&unsigned, covered) else {
            panic!("signature base");
        };
        let mut signature = signing_key().sign(base.as_bytes()).to_bytes();
        if tamper && let Some(byte) = signature.last_mut() {
            *byte ^= 0x80;
        }

        headers.insert("signature-input", header(&format!("sig1={covered}")));
        headers.insert(
            "signature",
            header(&format!("sig1=:{}:", STANDARD.encode(signature))),
        );
        SignedRequest::new(Method::POST, &uri, headers, Bytes::from_static(body))
    }

    fn covered() -> String {
        format!(
            r#"("@method" "@authority" "@path" "@query" "content-type" "content-digest");created={NOW};keyid="test-key-ed25519";alg="ed25519""#
        )
    }

    #[test]
    fn base_matches_expected_layout() {
        let request = signed_request(&covered(), BODY, false);
        let Ok(base) = signature_base(
            &request,
            r#"("@method" "@path" "@query");keyid="k""#,
        ) else {
            panic!("signature base");
        };
        assert_eq!(
            base,
            "\"@method\": POST\n\"@path\": /api/v1/webhook/events/abc\n\"@query\": ?x=1\n\"@signature-params\": (\"@method\" \"@path\" \"@query\");keyid=\"k\""
        );
    }

    #[test]
    fn valid_signature_verifies() {
        let result = verify(
            &signed_request(&covered(), BODY, false),
            &policy(),
            &VerifyOptions::default(),
            now(),
        );
        assert!(result.verified, "{:?}", result.reason);
        let Some(parsed) = result.parsed else {
            panic!("parsed params expected");
        };
        assert_eq!(parsed.get("keyid").map(String::as_str), Some("test-key-ed25519"));
        assert_eq!(parsed.get("label").map(String::as_str), Some("sig1"));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let result = verify(
            &signed_request(&covered(), BODY, true),
            &policy(),
            &VerifyOptions::default(),
            now(),
        );
        assert!(!result.verified);
        assert_eq!(result.reason.as_deref(), Some("invalid signature"));
    }

    #[test]
    fn body_not_matching_content_digest_is_rejected() {
        let result = verify(
            &signed_request(&covered(), b"{}", false),
            &policy(),
            &VerifyOptions::default(),
            now(),
        );
        assert!(!result.verified);
        assert!(
            result
                .reason
                .as_deref()
                .is_some_and(|r| r.starts_with("digest mismatch"))
        );
    }

    #[test]
    fn expired_signature_is_rejected() {
        let covered = format!(
            r#"("@method" "@path");created={};expires={};keyid="test-key-ed25519""#,
            NOW - 120,
            NOW - 60
        );
        let result = verify(
            &signed_request(&covered, BODY, false),
            &policy(),
            &VerifyOptions::default(),
            now(),
        );
        assert_eq!(result.reason.as_deref(), Some("signature expired"));
    }

    #[test]
    fn component_parameters_are_unsupported() {
        let covered = r#"("@query-param";name="x");keyid="test-key-ed25519""#;
        let uri: Uri = "/?x=1".parse().unwrap_or_default();
        let mut headers = HeaderMap::new();
        headers.insert("signature-input", header(&format!("sig1={covered}")));
        headers.insert("signature", header(&format!("sig1=:{}:", STANDARD.encode([0u8; 64]))));
        let request = SignedRequest::new(Method::POST, &uri, headers, Bytes::new());
        let result = verify(&request, &policy(), &VerifyOptions::default(), now());
        assert!(!result.verified);
        assert!(
            result
                .reason
                .as_deref()
                .is_some_and(|r| r.starts_with("unsupported component"))
        );
    }

    #[test]
    fn missing_headers_are_reported() {
        let uri: Uri = "/".parse().unwrap_or_default();
        let request = SignedRequest::new(Method::POST, &uri, HeaderMap::new(), Bytes::new());
        let result = verify(&request, &policy(), &VerifyOptions::default(), now());
        assert_eq!(result.reason.as_deref(), Some("missing signature-input header"));
    }

    #[test]
    fn label_without_signature_is_skipped() {
        let request = signed_request(&covered(), BODY, false);
        let Some(input) = request.header("signature-input") else {
            panic!("input header");
        };
        let Some(signature) = request.header("signature") else {
            panic!("signature header");
        };
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("relay.example.com"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert(
            "content-digest",
            header(&format!("sha-256=:{}:", STANDARD.encode(Sha256::digest(BODY)))),
        );
        headers.insert(
            "signature-input",
            header(&format!(r#"orphan=("@method");keyid="nobody", {input}"#)),
        );
        headers.insert("signature", header(&signature));
        let uri: Uri = "/api/v1/webhook/events/abc?x=1".parse().unwrap_or_default();
        let request = SignedRequest::new(Method::POST, &uri, headers, Bytes::from_static(BODY));
        let result = verify(&request, &policy(), &VerifyOptions::default(), now());
        assert!(result.verified, "{:?}", result.reason);
    }
}
