//! Argon2 hashing and verification for API key secrets.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("{operation}: {message}")]
pub struct HashError {
    operation: &'static str,
    message: String,
}

impl HashError {
    fn new(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self {
            operation,
            message: err.to_string(),
        }
    }
}

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    /// Cheap parameters for tests. Never use these for stored credentials.
    pub const fn insecure_for_tests() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn to_argon2(self) -> Result<Argon2<'static>, HashError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| HashError::new("create argon2 params", e))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Reject parameters Argon2 itself would refuse, so a bad config fails at startup.
    pub fn validate(self) -> Result<(), HashError> {
        self.to_argon2().map(|_| ())
    }
}

impl Default for Argon2Params {
    /// Argon2id RFC recommendations
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Hash a secret with a fresh random salt. The result is a PHC string that embeds the salt and
/// the parameters.
pub fn hash_secret(input: &str, params: Argon2Params) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.to_argon2()?;

    let hash = argon2
        .hash_password(input.as_bytes(), &salt)
        .map_err(|e| HashError::new("hash secret", e))?;

    Ok(hash.to_string())
}

/// Verify a presented secret against a stored PHC string.
///
/// Verification re-derives the hash using the salt and parameters embedded in `hash`, and the
/// final comparison is constant time. A mismatch is `Ok(false)`; only an unparseable stored hash
/// is an error.
pub fn verify_secret(input: &str, hash: &str) -> Result<bool, HashError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| HashError::new("parse hash", e))?;

    Ok(Argon2::default().verify_password(input.as_bytes(), &parsed_hash).is_ok())
}
