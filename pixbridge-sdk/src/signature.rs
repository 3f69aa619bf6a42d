//! Signature algorithms used around the settlement engine.
//!
//! Two schemes exist:
//!
//! * **Body signing** (internal notifications, PIX provider webhook):
//!   lowercase hex of `HMAC-SHA256(secret, raw_body)`, carried in
//!   [`SIGNATURE_HEADER`] or [`PROVIDER_SIGNATURE_HEADER`].
//!
//! * **Signer requests** (outbound calls to the HD signing service):
//!   lowercase hex of `HMAC-SHA256(secret, "{ts}.{nonce}." ++ raw_json)`,
//!   carried in the `x-ts`, `x-nonce` and `x-signer-hmac` headers.
//!
//! Verification always goes through `ring::hmac::verify`, which compares in
//! constant time.

use ring::hmac;

/// Header carrying the body signature of internal notifications.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Header carrying the body signature of PIX provider webhooks.
pub const PROVIDER_SIGNATURE_HEADER: &str = "x-pagbank-signature";

/// Optional client-supplied idempotency key on mutating internal endpoints.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Unix timestamp header of a signer request.
pub const SIGNER_TIMESTAMP_HEADER: &str = "x-ts";

/// Random hex nonce header of a signer request.
pub const SIGNER_NONCE_HEADER: &str = "x-nonce";

/// HMAC header of a signer request.
pub const SIGNER_HMAC_HEADER: &str = "x-signer-hmac";

/// Maximum clock skew a signer accepts on `x-ts` (in seconds).
pub const MAX_SIGNER_SKEW: i64 = 5 * 60;

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn key(secret: &[u8]) -> hmac::Key {
    hmac::Key::new(hmac::HMAC_SHA256, secret)
}

// ---------------------------------------------------------------------------
// Body signing
// ---------------------------------------------------------------------------

/// Sign a raw request body, returning the lowercase hex digest.
pub fn sign_body(secret: &[u8], body: &[u8]) -> String {
    hex::encode(hmac::sign(&key(secret), body).as_ref())
}

/// Verify a hex body signature against the raw request body.
pub fn verify_body(secret: &[u8], body: &[u8], signature_hex: &str) -> Result<(), SignatureError> {
    let signature = hex::decode(signature_hex.trim()).map_err(|_| SignatureError::InvalidHex)?;
    hmac::verify(&key(secret), body, &signature)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Signer request signing
// ---------------------------------------------------------------------------

/// The authentication headers of one signer request.
///
/// The nonce salts the MAC so that two requests with the same body in the
/// same second still carry distinct signatures, and the timestamp lets the
/// signer reject captured requests replayed later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerHeaders {
    pub timestamp: i64,
    pub nonce: String,
    pub hmac: String,
}

impl SignerHeaders {
    /// Sign `body` with the current time and a fresh 8-byte random nonce.
    pub fn sign(secret: &[u8], body: &[u8]) -> Self {
        let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
        let nonce = hex::encode(rand::random::<[u8; 8]>());
        Self::sign_with(secret, timestamp, nonce, body)
    }

    /// Sign `body` with an explicit timestamp and nonce.
    pub fn sign_with(secret: &[u8], timestamp: i64, nonce: String, body: &[u8]) -> Self {
        let hmac = hex::encode(hmac::sign(&key(secret), &Self::message(timestamp, &nonce, body)).as_ref());
        Self {
            timestamp,
            nonce,
            hmac,
        }
    }

    /// Verify the headers against `body` and check the timestamp is within
    /// [`MAX_SIGNER_SKEW`] of `now`.
    pub fn verify(&self, secret: &[u8], body: &[u8], now: i64) -> Result<(), SignatureError> {
        let signature = hex::decode(&self.hmac).map_err(|_| SignatureError::InvalidHex)?;
        hmac::verify(
            &key(secret),
            &Self::message(self.timestamp, &self.nonce, body),
            &signature,
        )?;
        if (now - self.timestamp).abs() > MAX_SIGNER_SKEW {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }

    fn message(timestamp: i64, nonce: &str, body: &[u8]) -> Vec<u8> {
        let prefix = format!("{timestamp}.{nonce}.");
        let mut data = Vec::with_capacity(prefix.len() + body.len());
        data.extend_from_slice(prefix.as_bytes());
        data.extend_from_slice(body);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_signature_round_trip() {
        let body = br#"{"txHash":"abc","amount":18.1}"#;
        let sig = sign_body(b"secret", body);
        assert_eq!(sig.len(), 64);
        assert!(verify_body(b"secret", body, &sig).is_ok());
    }

    #[test]
    fn body_signature_rejects_tampering() {
        let sig = sign_body(b"secret", b"{\"amount\":1}");
        assert!(matches!(
            verify_body(b"secret", b"{\"amount\":2}", &sig),
            Err(SignatureError::SignatureMismatch)
        ));
        assert!(matches!(
            verify_body(b"other", b"{\"amount\":1}", &sig),
            Err(SignatureError::SignatureMismatch)
        ));
        assert!(matches!(
            verify_body(b"secret", b"{\"amount\":1}", "zz"),
            Err(SignatureError::InvalidHex)
        ));
    }

    #[test]
    fn signer_headers_cover_timestamp_and_nonce() {
        let body = br#"{"derivationIndex":3}"#;
        let a = SignerHeaders::sign_with(b"k", 1_700_000_000, "00aa".into(), body);
        let b = SignerHeaders::sign_with(b"k", 1_700_000_000, "00ab".into(), body);
        assert_ne!(a.hmac, b.hmac);
        assert!(a.verify(b"k", body, 1_700_000_010).is_ok());

        let mut forged = a.clone();
        forged.timestamp += 1;
        assert!(forged.verify(b"k", body, 1_700_000_010).is_err());
    }

    #[test]
    fn signer_headers_expire() {
        let h = SignerHeaders::sign_with(b"k", 1_000, "01".into(), b"{}");
        assert!(matches!(
            h.verify(b"k", b"{}", 1_000 + MAX_SIGNER_SKEW + 1),
            Err(SignatureError::Expired)
        ));
    }

    #[test]
    fn fresh_nonces_differ() {
        let a = SignerHeaders::sign(b"k", b"{}");
        let b = SignerHeaders::sign(b"k", b"{}");
        assert_eq!(a.nonce.len(), 16);
        assert_ne!(a.nonce, b.nonce);
    }
}
