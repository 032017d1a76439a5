use crate::db::errors::Result;
use crate::db::models::transactions::{PendingDepositCreateDBRequest, Transaction, TransactionKind, TransactionStatus};
use crate::types::{abbrev_uuid, TransactionId, UserId};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const TRANSACTION_COLUMNS: &str = "id, sender_id, receiver_id, amount, kind, status, reference, created_at, updated_at";

pub struct Transactions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Transactions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(sender_id = %abbrev_uuid(&sender_id), receiver_id = %abbrev_uuid(&receiver_id)), err)]
    pub async fn insert_transfer(&mut self, sender_id: UserId, receiver_id: UserId, amount: Decimal) -> Result<Transaction> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "INSERT INTO transactions (id, sender_id, receiver_id, amount, kind, status)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(sender_id)
        .bind(receiver_id)
        .bind(amount)
        .bind(TransactionKind::Transfer)
        .bind(TransactionStatus::Success)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(transaction)
    }

    #[instrument(skip(self, request), fields(reference = %request.reference), err)]
    pub async fn insert_pending_deposit(&mut self, request: &PendingDepositCreateDBRequest) -> Result<Transaction> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "INSERT INTO transactions (id, sender_id, receiver_id, amount, kind, status, reference)
             VALUES ($1, NULL, $2, $3, $4, $5, $6)
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(request.receiver_id)
        .bind(request.amount)
        .bind(TransactionKind::Deposit)
        .bind(TransactionStatus::Pending)
        .bind(&request.reference)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(transaction)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_reference(&mut self, reference: &str) -> Result<Option<Transaction>> {
        let transaction =
            sqlx::query_as::<_, Transaction>(&format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE reference = $1"))
                .bind(reference)
                .fetch_optional(&mut *self.db)
                .await?;
        Ok(transaction)
    }

    /// Fetch and row-lock a deposit so concurrent notifications for the same reference serialize.
    #[instrument(skip(self), err)]
    pub async fn lock_by_reference(&mut self, reference: &str) -> Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE reference = $1 FOR UPDATE"
        ))
        .bind(reference)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(transaction)
    }

    /// Move a pending transaction to `status`. Returns `None` if it was no longer pending.
    #[instrument(skip(self), fields(transaction_id = %abbrev_uuid(&id), status = %status), err)]
    pub async fn finish_pending(&mut self, id: TransactionId, status: TransactionStatus) -> Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions SET status = $2, updated_at = NOW()
             WHERE id = $1 AND status = 'pending'
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(transaction)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE sender_id = $1 OR receiver_id = $1
             ORDER BY created_at DESC, id DESC
             OFFSET $2 LIMIT $3"
        ))
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(transactions)
    }
}
