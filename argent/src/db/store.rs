//! Storage seams for the ledger and the credential registry.
//!
//! The services in [`crate::ledger`] and [`crate::keys`] only talk to storage through
//! [`LedgerStore`] and [`CredentialStore`]. Every method that reads and then writes is atomic
//! with respect to concurrent calls on the same store: the PostgreSQL implementations in
//! [`crate::db::postgres`] use row locks and advisory locks inside one database transaction,
//! and [`crate::db::in_memory`] holds a single mutex for the duration of the call.
//!
//! Business outcomes that callers branch on (insufficient funds, quota exhaustion, an already
//! settled deposit) are returned as outcome enums rather than as [`DbError`](crate::db::errors::DbError),
//! which is reserved for storage failures.

use crate::db::errors::Result;
use crate::db::models::{
    api_keys::{ApiKey, ApiKeyCreateDBRequest, ApiKeyRolloverDBRequest},
    transactions::{PendingDepositCreateDBRequest, Transaction},
    users::{User, UserCreateDBRequest},
    wallets::Wallet,
};
use crate::types::{ApiKeyId, UserId, WalletId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Result of an atomic transfer attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// Both balances moved and the transfer row was written.
    Committed(Transaction),
    /// The sender's balance at lock time was below the amount. Nothing was written.
    InsufficientFunds { available: Decimal },
}

/// Result of settling a deposit by gateway reference.
#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// The deposit moved from pending to success and the wallet was credited.
    Credited { transaction: Transaction, balance: Decimal },
    /// The deposit was already successful. Nothing changed.
    AlreadySettled(Transaction),
    /// The deposit had already failed. Nothing changed.
    AlreadyFailed(Transaction),
    /// The gateway reported an amount that differs from the recorded one. Nothing changed.
    AmountMismatch { transaction: Transaction, notified: Decimal },
    /// No deposit carries this reference.
    UnknownReference,
}

/// Result of inserting a key under the per-user quota.
#[derive(Debug, Clone, PartialEq)]
pub enum IssueOutcome {
    Issued(ApiKey),
    QuotaExceeded { active: usize },
}

/// Result of revoking a key on behalf of a user.
#[derive(Debug, Clone, PartialEq)]
pub enum RevokeOutcome {
    Revoked(ApiKey),
    AlreadyRevoked(ApiKey),
    NotOwner,
    NotFound,
}

/// Result of an atomic revoke-then-reissue.
#[derive(Debug, Clone, PartialEq)]
pub enum RolloverOutcome {
    /// The old key is revoked and the replacement is stored.
    RolledOver { revoked: ApiKeyId, issued: ApiKey },
    NotFound,
    NotOwner,
    /// The old key has not reached its expiry instant.
    NotExpired { expires_at: DateTime<Utc> },
    /// The old key already expired and was revoked before.
    AlreadyRevoked,
    /// Issuing the replacement would exceed the quota. The revocation was undone.
    QuotaExceeded { active: usize },
}

/// Users, wallets and the transaction ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Return the user with this email, creating it together with a zero-balance wallet when
    /// absent. Creation of the user and the wallet is one unit.
    async fn find_or_create_user(&self, request: &UserCreateDBRequest) -> Result<(User, Wallet)>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;

    async fn wallet_for_user(&self, user_id: UserId) -> Result<Option<Wallet>>;

    /// Resolve a transfer target. The identifier may name a wallet directly or the user who
    /// owns it.
    async fn resolve_wallet(&self, identifier: Uuid) -> Result<Option<Wallet>>;

    /// Debit `from`, credit `to` and record a successful transfer, or change nothing at all.
    async fn transfer(&self, from: WalletId, to: WalletId, amount: Decimal) -> Result<TransferOutcome>;

    /// Record a pending deposit. Fails with a unique violation if the reference is taken.
    async fn insert_pending_deposit(&self, request: &PendingDepositCreateDBRequest) -> Result<Transaction>;

    /// Move a pending deposit to success and credit the receiver in one unit.
    ///
    /// When `notified_amount` is given it must equal the recorded amount.
    async fn settle_deposit(&self, reference: &str, notified_amount: Option<Decimal>) -> Result<SettleOutcome>;

    /// Move a pending deposit to failed. Terminal deposits are returned unchanged.
    async fn fail_deposit(&self, reference: &str) -> Result<Option<Transaction>>;

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>>;

    /// Transactions where the user is sender or receiver, newest first.
    async fn transactions_for_user(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<Transaction>>;
}

/// Hashed API key records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a key unless the owner already has `max_active` active keys at `now`.
    async fn insert_key_within_quota(
        &self,
        request: &ApiKeyCreateDBRequest,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> Result<IssueOutcome>;

    async fn active_keys_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Vec<ApiKey>>;

    /// Active keys whose lookup hint matches, across all users.
    async fn active_keys_by_hint(&self, lookup_hint: &str, now: DateTime<Utc>) -> Result<Vec<ApiKey>>;

    async fn get_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>>;

    /// Every key the user ever created, newest first.
    async fn keys_for_user(&self, user_id: UserId) -> Result<Vec<ApiKey>>;

    async fn revoke_key(&self, id: ApiKeyId, owner: UserId) -> Result<RevokeOutcome>;

    /// Revoke the expired key `old` and insert its replacement as one unit.
    async fn rollover_key(
        &self,
        old: ApiKeyId,
        owner: UserId,
        replacement: &ApiKeyRolloverDBRequest,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> Result<RolloverOutcome>;
}
