//! Database models for API keys.

use crate::types::{ApiKeyId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A capability an API key may carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum KeyPermission {
    Deposit,
    Transfer,
    Read,
}

impl KeyPermission {
    pub const ALL: [KeyPermission; 3] = [KeyPermission::Deposit, KeyPermission::Transfer, KeyPermission::Read];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyPermission::Deposit => "deposit",
            KeyPermission::Transfer => "transfer",
            KeyPermission::Read => "read",
        }
    }
}

impl fmt::Display for KeyPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid permission '{0}'")]
pub struct UnknownPermission(pub String);

impl FromStr for KeyPermission {
    type Err = UnknownPermission;

    /// Exact, case-sensitive match against the three known permission names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(KeyPermission::Deposit),
            "transfer" => Ok(KeyPermission::Transfer),
            "read" => Ok(KeyPermission::Read),
            other => Err(UnknownPermission(other.to_string())),
        }
    }
}

/// Database request for inserting a new API key.
///
/// Only the Argon2 hash of the secret is stored. `lookup_hint` is a short prefix of the secret
/// body that lets a presented key be matched against a handful of candidates instead of every
/// key in the table.
#[derive(Debug, Clone)]
pub struct ApiKeyCreateDBRequest {
    pub user_id: UserId,
    pub name: String,
    pub hashed_secret: String,
    pub lookup_hint: String,
    pub permissions: Vec<KeyPermission>,
    pub expires_at: DateTime<Utc>,
}

/// Replacement material for a rolled-over key. Name and permissions are copied from the key
/// being replaced.
#[derive(Debug, Clone)]
pub struct ApiKeyRolloverDBRequest {
    pub hashed_secret: String,
    pub lookup_hint: String,
    pub expires_at: DateTime<Utc>,
}

/// A stored API key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub name: String,
    pub hashed_secret: String,
    pub lookup_hint: String,
    pub permissions: Vec<KeyPermission>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Active means usable: neither revoked nor expired. Only active keys count toward the quota.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired(now)
    }

    pub fn has_permission(&self, permission: KeyPermission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn key(expires_at: DateTime<Utc>, is_revoked: bool) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "ci".to_string(),
            hashed_secret: String::new(),
            lookup_hint: "abcdefgh".to_string(),
            permissions: vec![KeyPermission::Read],
            expires_at,
            is_revoked,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_permission_parsing_is_exact() {
        assert_eq!("read".parse::<KeyPermission>(), Ok(KeyPermission::Read));
        assert_eq!("deposit".parse::<KeyPermission>(), Ok(KeyPermission::Deposit));
        assert!("Read".parse::<KeyPermission>().is_err());
        assert!("withdraw".parse::<KeyPermission>().is_err());
        assert!(" read".parse::<KeyPermission>().is_err());
    }

    #[test]
    fn test_activity() {
        let now = Utc::now();
        assert!(key(now + Duration::hours(1), false).is_active(now));
        assert!(!key(now + Duration::hours(1), true).is_active(now));
        assert!(!key(now - Duration::seconds(1), false).is_active(now));
        // expiry is inclusive of the boundary instant
        assert!(!key(now, false).is_active(now));
    }
}
