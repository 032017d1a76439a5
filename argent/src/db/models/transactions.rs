//! Database models for ledger transactions.

use crate::types::{TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// What moved the money.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// External funds credited through the payment gateway
    Deposit,
    /// Wallet-to-wallet movement between two users
    Transfer,
}

/// Lifecycle of a transaction.
///
/// Transfers are written as `Success` in the same database transaction that moves the balances.
/// Deposits start `Pending` and move to exactly one terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the `transactions` table.
///
/// `sender_id` is `None` for deposits. `reference` is the gateway reference for deposits and
/// `None` for transfers; when present it is unique across the table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub sender_id: Option<UserId>,
    pub receiver_id: UserId,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Whether `user_id` is the sender or the receiver.
    pub fn involves(&self, user_id: UserId) -> bool {
        self.receiver_id == user_id || self.sender_id == Some(user_id)
    }
}

/// Database request for recording a pending deposit before the payer is redirected.
#[derive(Debug, Clone)]
pub struct PendingDepositCreateDBRequest {
    pub receiver_id: UserId,
    pub amount: Decimal,
    pub reference: String,
}
