//! Body digest checks for the `Digest` and `Content-Digest` headers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256, Sha512};

use super::SignatureError;

fn compute(algorithm: &str, body: &[u8]) -> Option<Vec<u8>> {
    match algorithm.to_ascii_lowercase().as_str() {
        "sha-256" => Some(Sha256::digest(body).to_vec()),
        "sha-512" => Some(Sha512::digest(body).to_vec()),
        _ => None,
    }
}

/// Checks a legacy `Digest` header (`SHA-256=<base64>`, RFC 3230).
///
/// Every supported algorithm listed must match; at least one must be
/// supported.
///
/// # Errors
///
/// Returns [`SignatureError::DigestMismatch`] on mismatch or when no
/// listed algorithm is supported.
pub fn verify_digest_header(value: &str, body: &[u8]) -> Result<(), SignatureError> {
    let mut checked = 0;
    for entry in value.split(',') {
        let Some((algorithm, encoded)) = entry.trim().split_once('=') else {
            return Err(SignatureError::Malformed(format!("digest entry {entry:?}")));
        };
        let Some(expected) = compute(algorithm, body) else {
            continue;
        };
        let actual = STANDARD
            .decode(encoded.trim())
            .map_err(|_| SignatureError::DigestMismatch(algorithm.to_string()))?;
        if actual != expected {
            return Err(SignatureError::DigestMismatch(algorithm.to_string()));
        }
        checked += 1;
    }
    if checked == 0 {
        return Err(SignatureError::DigestMismatch(
            "no supported digest algorithm".to_string(),
        ));
    }
    Ok(())
}

/// Checks one `Content-Digest` dictionary member (`sha-256=:<base64>:`).
///
/// # Errors
///
/// Returns [`SignatureError::DigestMismatch`] if the algorithm is not
/// supported or the digest differs.
pub fn verify_content_digest(algorithm: &str, expected: &[u8], body: &[u8]) -> Result<(), SignatureError> {
    match compute(algorithm, body) {
        Some(actual) if actual == expected => Ok(()),
        Some(_) => Err(SignatureError::DigestMismatch(algorithm.to_string())),
        None => Err(SignatureError::DigestMismatch(format!(
            "unsupported algorithm {algorithm}"
        ))),
    }
}

/// Formats a legacy `Digest` header value for `body`.
#[must_use]
pub fn sha256_digest_header(body: &[u8]) -> String {
    format!("SHA-256={}", STANDARD.encode(Sha256::digest(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_sha256_digest_passes() {
        let body = br#"{"hello":"world"}"#;
        assert!(verify_digest_header(&sha256_digest_header(body), body).is_ok());
    }

    #[test]
    fn tampered_body_fails() {
        let header = sha256_digest_header(b"original");
        assert!(matches!(
            verify_digest_header(&header, b"tampered"),
            Err(SignatureError::DigestMismatch(_))
        ));
    }

    #[test]
    fn unsupported_only_algorithm_fails() {
        assert!(verify_digest_header("MD5=abcd", b"x").is_err());
    }

    #[test]
    fn content_digest_sha512() {
        let body = b"payload";
        let expected = Sha512::digest(body).to_vec();
        assert!(verify_content_digest("sha-512", &expected, body).is_ok());
        assert!(verify_content_digest("sha-512", &expected, b"other").is_err());
    }
}
