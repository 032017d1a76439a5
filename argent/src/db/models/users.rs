//! Database models for users.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database request for creating (or finding) a user.
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub email: String,
    pub google_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

impl UserCreateDBRequest {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            google_id: None,
            first_name: String::new(),
            last_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub google_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}
