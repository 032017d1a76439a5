use base64::{Engine as _, engine::general_purpose};
use rand::prelude::RngExt;
use rand::rng;

/// Prefix of every issued API key.
pub const API_KEY_PREFIX: &str = "sk_live_";

/// Number of characters after the prefix kept in clear as the lookup hint.
pub const LOOKUP_HINT_LEN: usize = 8;

/// Prefix of every deposit reference handed to the payment gateway.
pub const DEPOSIT_REFERENCE_PREFIX: &str = "dep_";

/// Generates an API key with 384 bits of entropy.
///
/// Formatted as `sk_live_{base64url(48 random bytes)}`, 72 characters in total with no padding.
pub fn generate_api_key() -> String {
    let mut key_bytes = [0u8; 48];
    rng().fill(&mut key_bytes);

    format!("{API_KEY_PREFIX}{}", general_purpose::URL_SAFE_NO_PAD.encode(key_bytes))
}

/// The first [`LOOKUP_HINT_LEN`] characters of the key body, or `None` if `key` does not look
/// like an issued key.
pub fn lookup_hint(key: &str) -> Option<&str> {
    let body = key.strip_prefix(API_KEY_PREFIX)?;
    if body.len() < LOOKUP_HINT_LEN || !body.is_ascii() {
        return None;
    }
    Some(&body[..LOOKUP_HINT_LEN])
}

/// Generates a unique gateway reference for a deposit, `dep_{base64url(18 random bytes)}`.
pub fn generate_deposit_reference() -> String {
    let mut bytes = [0u8; 18];
    rng().fill(&mut bytes);

    format!("{DEPOSIT_REFERENCE_PREFIX}{}", general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_api_key_format() {
        let key = generate_api_key();

        assert!(key.starts_with("sk_live_"));
        // "sk_live_" (8) + base64url(48 bytes) (64)
        assert_eq!(key.len(), 72);

        let key_part = &key[API_KEY_PREFIX.len()..];
        assert!(key_part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_generate_api_key_uniqueness() {
        let mut keys = HashSet::new();
        for _ in 0..1000 {
            assert!(keys.insert(generate_api_key()), "Generated duplicate API key");
        }
    }

    #[test]
    fn test_lookup_hint() {
        let key = generate_api_key();
        let hint = lookup_hint(&key).unwrap();

        assert_eq!(hint.len(), LOOKUP_HINT_LEN);
        assert_eq!(hint, &key[8..16]);

        assert_eq!(lookup_hint("sk_test_abcdefghijkl"), None);
        assert_eq!(lookup_hint("sk_live_short"), None);
        assert_eq!(lookup_hint(""), None);
    }

    #[test]
    fn test_deposit_reference_format() {
        let reference = generate_deposit_reference();
        assert!(reference.starts_with("dep_"));
        assert_eq!(reference.len(), 4 + 24);
        assert_ne!(reference, generate_deposit_reference());
    }
}
