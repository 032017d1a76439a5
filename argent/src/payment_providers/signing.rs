//! HMAC-SHA512 signing for gateway notifications.
//!
//! The gateway signs the raw request body with the shared secret and sends the lowercase hex
//! digest in the `x-paystack-signature` header. Verification recomputes the MAC over the exact
//! bytes received; re-serializing the JSON first would break it.

use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the notification signature.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Sign a payload, returning the lowercase hex digest.
pub fn sign_payload(payload: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex signature over `payload`.
///
/// The comparison is the MAC's own constant-time check. Malformed hex is a mismatch.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(signature) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}
