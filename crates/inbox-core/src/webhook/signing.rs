//! Webhook payload signing and verification.
//!
//! HMAC-SHA256 over the exact serialized envelope bytes, hex-encoded and
//! prefixed `sha256=` in the `X-Signature-256` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub(crate) const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the signature header value for `body`.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a received signature header against `body`. Constant-time
/// comparison; false when the secret is empty, the header is malformed,
/// or the digests differ in length or content.
pub fn verify(body: &[u8], header: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some(hex_digest) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(digest) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&digest).is_ok()
}
