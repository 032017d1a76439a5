//! API request/response models for the wallet.

use crate::db::models::{
    transactions::{Transaction, TransactionKind, TransactionStatus},
    wallets::Wallet,
};
use crate::ledger::ReconcileOutcome;
use crate::types::{TransactionId, UserId, WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCreate {
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCreate {
    /// Wallet id of the receiver, or the receiver's user id
    #[serde(alias = "wallet_number")]
    pub wallet_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletResponse {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id,
            user_id: wallet.user_id,
            balance: wallet.balance,
            created_at: wallet.created_at,
        }
    }
}

/// Which way money moved from the viewer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: TransactionId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
}

impl TransactionResponse {
    /// Render a transaction as seen by `viewer`.
    pub fn for_user(transaction: Transaction, viewer: UserId) -> Self {
        let direction = if transaction.sender_id == Some(viewer) {
            Direction::Debit
        } else {
            Direction::Credit
        };
        Self {
            id: transaction.id,
            kind: transaction.kind,
            amount: transaction.amount,
            status: transaction.status,
            reference: transaction.reference,
            direction,
            created_at: transaction.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Number of items to skip
    pub skip: Option<i64>,
    /// Maximum number of items to return (default 100, max 1000)
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DepositCallbackQuery {
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCallbackResponse {
    pub reference: Option<String>,
    pub message: String,
}

/// Acknowledgement sent back to the gateway. Any 2xx stops its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: bool,
    pub outcome: String,
}

impl From<ReconcileOutcome> for WebhookResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        let outcome = match outcome {
            ReconcileOutcome::Credited { .. } => "credited",
            ReconcileOutcome::AlreadyProcessed { .. } => "already_processed",
            ReconcileOutcome::Ignored { .. } => "ignored",
        };
        Self {
            status: true,
            outcome: outcome.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_direction_follows_viewer() {
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        let transfer = Transaction {
            id: Uuid::new_v4(),
            sender_id: Some(alice),
            receiver_id: bob,
            amount: dec!(4.20),
            kind: TransactionKind::Transfer,
            status: TransactionStatus::Success,
            reference: None,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(TransactionResponse::for_user(transfer.clone(), alice).direction, Direction::Debit);
        assert_eq!(TransactionResponse::for_user(transfer.clone(), bob).direction, Direction::Credit);

        let json = serde_json::to_value(TransactionResponse::for_user(transfer, bob)).unwrap();
        assert_eq!(json["type"], "transfer");
        assert_eq!(json["direction"], "credit");
        assert_eq!(json["status"], "success");
    }

    #[test]
    fn test_transfer_accepts_wallet_number_alias() {
        let id = Uuid::new_v4();
        let body: TransferCreate = serde_json::from_value(serde_json::json!({
            "wallet_number": id,
            "amount": "12.50"
        }))
        .unwrap();
        assert_eq!(body.wallet_id, id);
        assert_eq!(body.amount, dec!(12.50));
    }
}
