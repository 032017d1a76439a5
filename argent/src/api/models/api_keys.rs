//! API request/response models for API keys.

use crate::db::models::api_keys::{ApiKey, KeyPermission};
use crate::keys::{IssuedKey, KeyCreateRequest};
use crate::types::ApiKeyId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyCreate {
    pub name: String,
    /// Any of "deposit", "transfer", "read"
    pub permissions: Vec<String>,
    /// One of "1H", "1D", "1M", "1Y"
    pub expiry: String,
}

impl From<ApiKeyCreate> for KeyCreateRequest {
    fn from(create: ApiKeyCreate) -> Self {
        Self {
            name: create.name,
            permissions: create.permissions,
            expiry: create.expiry,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRollover {
    pub expired_key_id: ApiKeyId,
    pub expiry: String,
}

/// Returned once, when a key is issued. The only response that carries the secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub id: ApiKeyId,
    pub name: String,
    pub api_key: String,
    pub permissions: Vec<KeyPermission>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<IssuedKey> for ApiKeyResponse {
    fn from(issued: IssuedKey) -> Self {
        Self {
            id: issued.key.id,
            name: issued.key.name,
            api_key: issued.secret,
            permissions: issued.key.permissions,
            expires_at: issued.key.expires_at,
            created_at: issued.key.created_at,
        }
    }
}

/// Key metadata. Never contains the secret or its hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyInfoResponse {
    pub id: ApiKeyId,
    pub name: String,
    pub permissions: Vec<KeyPermission>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    /// Neither revoked nor expired at the time of the response
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyInfoResponse {
    pub fn new(key: ApiKey, now: DateTime<Utc>) -> Self {
        Self {
            active: key.is_active(now),
            id: key.id,
            name: key.name,
            permissions: key.permissions,
            expires_at: key.expires_at,
            is_revoked: key.is_revoked,
            created_at: key.created_at,
        }
    }
}
