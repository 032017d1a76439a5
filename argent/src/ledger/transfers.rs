//! Wallet-to-wallet transfers and ledger reads.

use crate::db::errors::DbError;
use crate::db::models::{transactions::Transaction, wallets::Wallet};
use crate::db::store::{LedgerStore, TransferOutcome};
use crate::ledger::LedgerError;
use crate::types::{abbrev_uuid, validate_amount, UserId};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Default and maximum page sizes for transaction history.
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;
pub const MAX_HISTORY_LIMIT: i64 = 1000;

pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Move `amount` from the sender's wallet to the wallet named by `receiver`.
    ///
    /// `receiver` may be a wallet id or the id of the user who owns the wallet. The debit, the
    /// credit and the `transfer` transaction row are committed together or not at all.
    #[instrument(skip(self), fields(sender = %abbrev_uuid(&sender), receiver = %abbrev_uuid(&receiver)), err)]
    pub async fn transfer(&self, sender: UserId, receiver: Uuid, amount: Decimal) -> Result<Transaction, LedgerError> {
        let amount = validate_amount(amount)?;

        let from = self
            .store
            .wallet_for_user(sender)
            .await?
            .ok_or_else(|| LedgerError::WalletNotFound(sender.to_string()))?;
        let to = self
            .store
            .resolve_wallet(receiver)
            .await?
            .ok_or_else(|| LedgerError::WalletNotFound(receiver.to_string()))?;
        if from.id == to.id {
            return Err(LedgerError::SelfTransfer);
        }

        match self.store.transfer(from.id, to.id, amount).await {
            Ok(TransferOutcome::Committed(transaction)) => {
                info!(transaction_id = %abbrev_uuid(&transaction.id), %amount, "Transfer committed");
                Ok(transaction)
            }
            Ok(TransferOutcome::InsufficientFunds { available }) => Err(LedgerError::InsufficientFunds {
                available,
                requested: amount,
            }),
            // a wallet disappeared between resolution and locking
            Err(DbError::NotFound) => Err(LedgerError::WalletNotFound(receiver.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn wallet(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        self.store
            .wallet_for_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::WalletNotFound(user_id.to_string()))
    }

    pub async fn balance(&self, user_id: UserId) -> Result<Decimal, LedgerError> {
        Ok(self.wallet(user_id).await?.balance)
    }

    /// Transactions the user sent or received, most recent first.
    pub async fn history(&self, user_id: UserId, skip: Option<i64>, limit: Option<i64>) -> Result<Vec<Transaction>, LedgerError> {
        let skip = skip.unwrap_or(0).max(0);
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.store.transactions_for_user(user_id, skip, limit).await?)
    }
}
