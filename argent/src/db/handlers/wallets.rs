use crate::db::errors::{DbError, Result};
use crate::db::models::wallets::Wallet;
use crate::types::{abbrev_uuid, UserId, WalletId};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const WALLET_COLUMNS: &str = "id, user_id, balance, created_at, updated_at";

pub struct Wallets<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Wallets<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create(&mut self, user_id: UserId) -> Result<Wallet> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "INSERT INTO wallets (id, user_id, balance) VALUES ($1, $2, 0) RETURNING {WALLET_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(wallet)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_by_user(&mut self, user_id: UserId) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1"))
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(wallet)
    }

    /// Match on wallet id first, then on owner id.
    #[instrument(skip(self), fields(identifier = %abbrev_uuid(&identifier)), err)]
    pub async fn resolve(&mut self, identifier: Uuid) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets
             WHERE id = $1 OR user_id = $1
             ORDER BY (id = $1) DESC
             LIMIT 1"
        ))
        .bind(identifier)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(wallet)
    }

    /// Lock the given wallets `FOR UPDATE` in id order, so two transfers touching the same pair
    /// in opposite directions always acquire the locks in the same sequence.
    #[instrument(skip(self), err)]
    pub async fn lock_for_update(&mut self, ids: &[WalletId]) -> Result<Vec<Wallet>> {
        let wallets = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(ids)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(wallets)
    }

    /// Subtract `amount` and return the new balance. The table's non-negative check rejects an
    /// overdraft with [`DbError::CheckViolation`].
    #[instrument(skip(self), fields(wallet_id = %abbrev_uuid(&id)), err)]
    pub async fn debit(&mut self, id: WalletId, amount: Decimal) -> Result<Decimal> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            "UPDATE wallets SET balance = balance - $2, updated_at = NOW() WHERE id = $1 RETURNING balance",
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&mut *self.db)
        .await?;
        balance.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(wallet_id = %abbrev_uuid(&id)), err)]
    pub async fn credit(&mut self, id: WalletId, amount: Decimal) -> Result<Decimal> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            "UPDATE wallets SET balance = balance + $2, updated_at = NOW() WHERE id = $1 RETURNING balance",
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&mut *self.db)
        .await?;
        balance.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn credit_user(&mut self, user_id: UserId, amount: Decimal) -> Result<Decimal> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            "UPDATE wallets SET balance = balance + $2, updated_at = NOW() WHERE user_id = $1 RETURNING balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *self.db)
        .await?;
        balance.ok_or(DbError::NotFound)
    }
}
