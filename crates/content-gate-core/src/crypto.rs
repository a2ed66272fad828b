//! HMAC-SHA256 signature verification for content-change webhooks.
//!
//! The content source signs the raw request body with a shared secret and
//! sends the tag in a header. Accepted header formats:
//! - `sha256=<hex>` or `v1=<hex>`
//! - raw hex (64 characters, either case)
//! - standard or URL-safe base64, with or without padding
//!
//! Tags are compared in constant time by `Mac::verify_slice`.

use std::fmt;

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};
use hmac::{Hmac, Mac};
use http::{HeaderMap, HeaderName};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::{GateError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 tag in bytes.
pub const TAG_LEN: usize = 32;

/// Default header carrying the signature.
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-signature";

/// Shared secret used to authenticate the content source.
///
/// Never serialized; `Debug` output is redacted.
#[derive(Clone)]
pub struct WebhookSecret(SecretString);

impl WebhookSecret {
    /// Wraps a secret value.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Configuration` when the value is blank.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(GateError::Configuration("webhook secret is empty".to_string()));
        }
        Ok(Self(SecretString::new(secret)))
    }

    fn key_bytes(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(***)")
    }
}

/// Computes the hex HMAC-SHA256 tag of `payload` under `secret`.
///
/// Used by senders and test fixtures; the gate itself only verifies.
///
/// # Errors
///
/// Returns `GateError::Configuration` if the secret cannot key the MAC.
pub fn sign_payload(payload: &[u8], secret: &WebhookSecret) -> Result<String> {
    let mut mac = keyed_mac(secret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies `signature` over `payload` and returns the decoded tag.
///
/// # Errors
///
/// Returns `GateError::InvalidSignature` when the signature cannot be
/// decoded or does not match.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &WebhookSecret) -> Result<Vec<u8>> {
    let tag = decode_signature(signature).ok_or(GateError::InvalidSignature)?;
    let mut mac = keyed_mac(secret)?;
    mac.update(payload);
    mac.verify_slice(&tag).map_err(|_| GateError::InvalidSignature)?;
    Ok(tag)
}

fn keyed_mac(secret: &WebhookSecret) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.key_bytes())
        .map_err(|_| GateError::Configuration("webhook secret cannot key HMAC-SHA256".to_string()))
}

/// Decodes a signature header value into raw tag bytes.
///
/// Returns `None` for anything that is not a 32-byte tag in one of the
/// accepted encodings.
pub fn decode_signature(signature: &str) -> Option<Vec<u8>> {
    let signature = signature.trim();
    let encoded = signature
        .strip_prefix("sha256=")
        .or_else(|| signature.strip_prefix("v1="))
        .unwrap_or(signature);

    if encoded.len() == TAG_LEN * 2 && encoded.chars().all(|c| c.is_ascii_hexdigit()) {
        return hex::decode(encoded).ok();
    }

    [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(encoded).ok())
        .filter(|tag| tag.len() == TAG_LEN)
}

/// Verifies request signatures against the configured secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: WebhookSecret,
    header: HeaderName,
}

impl SignatureVerifier {
    /// Creates a verifier reading the tag from `header`.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Configuration` if `header` is not a valid
    /// header name or the secret cannot key the MAC.
    pub fn new(secret: WebhookSecret, header: &str) -> Result<Self> {
        let header = HeaderName::try_from(header).map_err(|_| {
            GateError::Configuration(format!("invalid signature header name: {header:?}"))
        })?;
        keyed_mac(&secret)?;
        Ok(Self { secret, header })
    }

    /// Header the tag is read from.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Signs a payload with the configured secret.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Configuration` if the secret cannot key the MAC.
    pub fn sign(&self, payload: &[u8]) -> Result<String> {
        sign_payload(payload, &self.secret)
    }

    /// Verifies the request signature and returns the decoded tag.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidSignature` if the header is missing,
    /// not valid UTF-8, undecodable, or does not match the payload.
    pub fn verify(&self, headers: &HeaderMap, payload: &[u8]) -> Result<Vec<u8>> {
        let signature = headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or(GateError::InvalidSignature)?;

        verify_signature(payload, signature, &self.secret)
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &self.secret)
            .field("header", &self.header)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn secret() -> WebhookSecret {
        WebhookSecret::new("whsec_unit_Zq8Lr2").unwrap()
    }

    #[test]
    fn signature_roundtrip_succeeds() {
        let payload = br#"{"documentId":"a","changeType":"created"}"#;
        let signature = sign_payload(payload, &secret()).unwrap();

        let tag = verify_signature(payload, &signature, &secret()).unwrap();
        assert_eq!(tag.len(), TAG_LEN);
    }

    #[test]
    fn accepts_prefixed_uppercase_and_base64_forms() {
        let payload = b"payload";
        let hex_sig = sign_payload(payload, &secret()).unwrap();
        let raw = hex::decode(&hex_sig).unwrap();

        for signature in [
            format!("sha256={hex_sig}"),
            format!("v1={hex_sig}"),
            hex_sig.to_uppercase(),
            STANDARD.encode(&raw),
            URL_SAFE_NO_PAD.encode(&raw),
        ] {
            assert!(verify_signature(payload, &signature, &secret()).is_ok(), "{signature}");
        }
    }

    #[test]
    fn rejects_tampered_payload() {
        let signature = sign_payload(b"original", &secret()).unwrap();
        let err = verify_signature(b"tampered", &signature, &secret()).unwrap_err();
        assert!(matches!(err, GateError::InvalidSignature));
    }

    #[test]
    fn rejects_undecodable_signatures() {
        let almost_hex = "a".repeat(63);
        for signature in ["", "not-a-signature", "sha256=abc123", "v1=zz", almost_hex.as_str()] {
            assert!(decode_signature(signature).is_none(), "{signature}");
            assert!(verify_signature(b"p", signature, &secret()).is_err());
        }
    }

    #[test]
    fn blank_secret_is_a_configuration_error() {
        let err = WebhookSecret::new("   ").unwrap_err();
        assert_eq!(err.reason_code(), "configuration_error");
    }

    #[test]
    fn debug_output_redacts_secret() {
        let verifier = SignatureVerifier::new(secret(), DEFAULT_SIGNATURE_HEADER).unwrap();
        let rendered = format!("{verifier:?} {:?}", secret());
        assert!(!rendered.contains("Zq8Lr2"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn verifier_reads_configured_header() {
        let verifier = SignatureVerifier::new(secret(), "Sanity-Webhook-Signature").unwrap();
        let payload = b"body";
        let mut headers = HeaderMap::new();
        headers.insert(
            "sanity-webhook-signature",
            HeaderValue::from_str(&verifier.sign(payload).unwrap()).unwrap(),
        );

        assert!(verifier.verify(&headers, payload).is_ok());
        assert!(verifier.verify(&HeaderMap::new(), payload).is_err());
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let err = SignatureVerifier::new(secret(), "bad header").unwrap_err();
        assert_eq!(err.reason_code(), "configuration_error");
    }
}
