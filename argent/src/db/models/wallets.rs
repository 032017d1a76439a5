//! Database models for wallets.

use crate::types::{UserId, WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user's wallet. Every user owns exactly one, created alongside the user.
///
/// `balance` is stored as `NUMERIC(20, 2)` and the table carries a `balance >= 0` check, so a
/// debit that would overdraw fails at the database even if a caller skips the application check.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
