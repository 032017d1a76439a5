//! PostgreSQL implementations of the storage seams.
//!
//! Each trait method opens one database transaction and composes the repositories in
//! [`crate::db::handlers`] inside it. Returning early drops the transaction, which rolls it back.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::{ApiKeys, Transactions, Users, Wallets};
use crate::db::models::{
    api_keys::{ApiKey, ApiKeyCreateDBRequest, ApiKeyRolloverDBRequest},
    transactions::{PendingDepositCreateDBRequest, Transaction, TransactionStatus},
    users::{User, UserCreateDBRequest},
    wallets::Wallet,
};
use crate::db::store::{
    CredentialStore, IssueOutcome, LedgerStore, RevokeOutcome, RolloverOutcome, SettleOutcome, TransferOutcome,
};
use crate::types::{abbrev_uuid, ApiKeyId, UserId, WalletId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn find_or_create_user(&self, request: &UserCreateDBRequest) -> Result<(User, Wallet)> {
        let mut tx = self.pool.begin().await?;

        let created = Users::new(&mut tx).create_if_absent(request).await?;
        let pair = match created {
            Some(user) => {
                let wallet = Wallets::new(&mut tx).create(user.id).await?;
                debug!(user_id = %abbrev_uuid(&user.id), "Created user with wallet");
                (user, wallet)
            }
            None => {
                let mut users = Users::new(&mut tx);
                // A known Google account wins over the email it signs in with
                let by_google = match request.google_id.as_deref() {
                    Some(google_id) => users.get_by_google_id(google_id).await?,
                    None => None,
                };
                let user = match by_google {
                    Some(user) => user,
                    None => users.get_by_email(&request.email).await?.ok_or(DbError::NotFound)?,
                };
                let wallet = Wallets::new(&mut tx).get_by_user(user.id).await?.ok_or(DbError::NotFound)?;
                (user, wallet)
            }
        };

        tx.commit().await?;
        Ok(pair)
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).get(user_id).await
    }

    async fn wallet_for_user(&self, user_id: UserId) -> Result<Option<Wallet>> {
        let mut conn = self.pool.acquire().await?;
        Wallets::new(&mut conn).get_by_user(user_id).await
    }

    async fn resolve_wallet(&self, identifier: Uuid) -> Result<Option<Wallet>> {
        let mut conn = self.pool.acquire().await?;
        Wallets::new(&mut conn).resolve(identifier).await
    }

    #[instrument(skip(self), fields(from = %abbrev_uuid(&from), to = %abbrev_uuid(&to), %amount), err)]
    async fn transfer(&self, from: WalletId, to: WalletId, amount: Decimal) -> Result<TransferOutcome> {
        let mut tx = self.pool.begin().await?;

        let locked = Wallets::new(&mut tx).lock_for_update(&[from, to]).await?;
        let sender = locked.iter().find(|w| w.id == from).ok_or(DbError::NotFound)?;
        let receiver = locked.iter().find(|w| w.id == to).ok_or(DbError::NotFound)?;

        if sender.balance < amount {
            return Ok(TransferOutcome::InsufficientFunds {
                available: sender.balance,
            });
        }
        let (sender_user, receiver_user) = (sender.user_id, receiver.user_id);

        let mut wallets = Wallets::new(&mut tx);
        wallets.debit(from, amount).await?;
        wallets.credit(to, amount).await?;
        let transaction = Transactions::new(&mut tx)
            .insert_transfer(sender_user, receiver_user, amount)
            .await?;

        tx.commit().await?;
        Ok(TransferOutcome::Committed(transaction))
    }

    async fn insert_pending_deposit(&self, request: &PendingDepositCreateDBRequest) -> Result<Transaction> {
        let mut conn = self.pool.acquire().await?;
        Transactions::new(&mut conn).insert_pending_deposit(request).await
    }

    #[instrument(skip(self), err)]
    async fn settle_deposit(&self, reference: &str, notified_amount: Option<Decimal>) -> Result<SettleOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(deposit) = Transactions::new(&mut tx).lock_by_reference(reference).await? else {
            return Ok(SettleOutcome::UnknownReference);
        };

        match deposit.status {
            TransactionStatus::Success => return Ok(SettleOutcome::AlreadySettled(deposit)),
            TransactionStatus::Failed => return Ok(SettleOutcome::AlreadyFailed(deposit)),
            TransactionStatus::Pending => {}
        }

        if let Some(notified) = notified_amount
            && notified != deposit.amount
        {
            return Ok(SettleOutcome::AmountMismatch {
                transaction: deposit,
                notified,
            });
        }

        // The row lock makes the pending guard redundant, but it keeps the update safe on its own
        let Some(settled) = Transactions::new(&mut tx)
            .finish_pending(deposit.id, TransactionStatus::Success)
            .await?
        else {
            return Ok(SettleOutcome::AlreadySettled(deposit));
        };
        let balance = Wallets::new(&mut tx).credit_user(settled.receiver_id, settled.amount).await?;

        tx.commit().await?;
        Ok(SettleOutcome::Credited {
            transaction: settled,
            balance,
        })
    }

    #[instrument(skip(self), err)]
    async fn fail_deposit(&self, reference: &str) -> Result<Option<Transaction>> {
        let mut tx = self.pool.begin().await?;

        let Some(deposit) = Transactions::new(&mut tx).lock_by_reference(reference).await? else {
            return Ok(None);
        };
        if deposit.status.is_terminal() {
            return Ok(Some(deposit));
        }
        let failed = Transactions::new(&mut tx)
            .finish_pending(deposit.id, TransactionStatus::Failed)
            .await?;

        tx.commit().await?;
        Ok(failed)
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        Transactions::new(&mut conn).get_by_reference(reference).await
    }

    async fn transactions_for_user(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        Transactions::new(&mut conn).list_for_user(user_id, skip, limit).await
    }
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn insert_key_within_quota(
        &self,
        request: &ApiKeyCreateDBRequest,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> Result<IssueOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut keys = ApiKeys::new(&mut tx);

        keys.lock_owner(request.user_id).await?;
        let active = keys.count_active(request.user_id, now).await? as usize;
        if active >= max_active {
            return Ok(IssueOutcome::QuotaExceeded { active });
        }
        let key = keys.insert(request).await?;

        tx.commit().await?;
        Ok(IssueOutcome::Issued(key))
    }

    async fn active_keys_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Vec<ApiKey>> {
        let mut conn = self.pool.acquire().await?;
        ApiKeys::new(&mut conn).active_for_user(user_id, now).await
    }

    async fn active_keys_by_hint(&self, lookup_hint: &str, now: DateTime<Utc>) -> Result<Vec<ApiKey>> {
        let mut conn = self.pool.acquire().await?;
        ApiKeys::new(&mut conn).active_by_hint(lookup_hint, now).await
    }

    async fn get_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>> {
        let mut conn = self.pool.acquire().await?;
        ApiKeys::new(&mut conn).get(id).await
    }

    async fn keys_for_user(&self, user_id: UserId) -> Result<Vec<ApiKey>> {
        let mut conn = self.pool.acquire().await?;
        ApiKeys::new(&mut conn).list_for_user(user_id).await
    }

    #[instrument(skip(self), fields(key_id = %abbrev_uuid(&id)), err)]
    async fn revoke_key(&self, id: ApiKeyId, owner: UserId) -> Result<RevokeOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut keys = ApiKeys::new(&mut tx);

        let Some(key) = keys.get_for_update(id).await? else {
            return Ok(RevokeOutcome::NotFound);
        };
        if key.user_id != owner {
            return Ok(RevokeOutcome::NotOwner);
        }
        if key.is_revoked {
            return Ok(RevokeOutcome::AlreadyRevoked(key));
        }
        let revoked = keys.mark_revoked(id).await?;

        tx.commit().await?;
        Ok(RevokeOutcome::Revoked(revoked))
    }

    #[instrument(skip(self, replacement), fields(key_id = %abbrev_uuid(&old)), err)]
    async fn rollover_key(
        &self,
        old: ApiKeyId,
        owner: UserId,
        replacement: &ApiKeyRolloverDBRequest,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> Result<RolloverOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut keys = ApiKeys::new(&mut tx);

        keys.lock_owner(owner).await?;
        let Some(existing) = keys.get_for_update(old).await? else {
            return Ok(RolloverOutcome::NotFound);
        };
        if existing.user_id != owner {
            return Ok(RolloverOutcome::NotOwner);
        }
        if !existing.is_expired(now) {
            return Ok(RolloverOutcome::NotExpired {
                expires_at: existing.expires_at,
            });
        }
        if existing.is_revoked {
            return Ok(RolloverOutcome::AlreadyRevoked);
        }

        keys.mark_revoked(old).await?;
        let active = keys.count_active(owner, now).await? as usize;
        if active >= max_active {
            // dropping the transaction rolls the revocation back
            return Ok(RolloverOutcome::QuotaExceeded { active });
        }
        let issued = keys
            .insert(&ApiKeyCreateDBRequest {
                user_id: owner,
                name: existing.name,
                hashed_secret: replacement.hashed_secret.clone(),
                lookup_hint: replacement.lookup_hint.clone(),
                permissions: existing.permissions,
                expires_at: replacement.expires_at,
            })
            .await?;

        tx.commit().await?;
        Ok(RolloverOutcome::RolledOver { revoked: old, issued })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::api_keys::KeyPermission;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    async fn user_with_wallet(store: &PgLedgerStore, email: &str) -> (User, Wallet) {
        store
            .find_or_create_user(&UserCreateDBRequest::with_email(email))
            .await
            .unwrap()
    }

    async fn fund(store: &PgLedgerStore, user: &User, amount: Decimal) {
        let reference = format!("dep_{}", Uuid::new_v4().simple());
        store
            .insert_pending_deposit(&PendingDepositCreateDBRequest {
                receiver_id: user.id,
                amount,
                reference: reference.clone(),
            })
            .await
            .unwrap();
        let outcome = store.settle_deposit(&reference, None).await.unwrap();
        assert!(matches!(outcome, SettleOutcome::Credited { .. }));
    }

    fn key_request(user_id: UserId, expires_at: DateTime<Utc>) -> ApiKeyCreateDBRequest {
        ApiKeyCreateDBRequest {
            user_id,
            name: "ci".to_string(),
            hashed_secret: "$argon2id$placeholder".to_string(),
            lookup_hint: Uuid::new_v4().simple().to_string()[..8].to_string(),
            permissions: vec![KeyPermission::Read],
            expires_at,
        }
    }

    #[sqlx::test]
    async fn test_find_or_create_user_is_stable(pool: PgPool) {
        let store = PgLedgerStore::new(pool);
        let (first, wallet) = user_with_wallet(&store, "ada@example.com").await;
        let (again, same_wallet) = user_with_wallet(&store, "ada@example.com").await;

        assert_eq!(first.id, again.id);
        assert_eq!(wallet.id, same_wallet.id);
        assert_eq!(wallet.balance, Decimal::ZERO);
        assert_eq!(store.resolve_wallet(first.id).await.unwrap().unwrap().id, wallet.id);
    }

    #[sqlx::test]
    async fn test_returning_google_account_with_new_email_resolves_to_owner(pool: PgPool) {
        let store = PgLedgerStore::new(pool);
        let request = |email: &str| UserCreateDBRequest {
            google_id: Some("google-sub-42".to_string()),
            ..UserCreateDBRequest::with_email(email)
        };
        let (owner, wallet) = store.find_or_create_user(&request("ada@example.com")).await.unwrap();
        let (again, same_wallet) = store.find_or_create_user(&request("ada@new-domain.example")).await.unwrap();

        assert_eq!(again.id, owner.id);
        assert_eq!(again.email, "ada@example.com");
        assert_eq!(same_wallet.id, wallet.id);
    }

    #[sqlx::test]
    async fn test_transfer_moves_both_balances(pool: PgPool) {
        let store = PgLedgerStore::new(pool);
        let (a, a_wallet) = user_with_wallet(&store, "a@example.com").await;
        let (b, b_wallet) = user_with_wallet(&store, "b@example.com").await;
        fund(&store, &a, dec!(100.00)).await;

        let outcome = store.transfer(a_wallet.id, b_wallet.id, dec!(40.00)).await.unwrap();
        let TransferOutcome::Committed(transaction) = outcome else {
            panic!("expected a committed transfer, got {outcome:?}");
        };
        assert_eq!(transaction.sender_id, Some(a.id));
        assert_eq!(transaction.status, TransactionStatus::Success);

        let short = store.transfer(a_wallet.id, b_wallet.id, dec!(60.01)).await.unwrap();
        assert_eq!(short, TransferOutcome::InsufficientFunds { available: dec!(60.00) });

        assert_eq!(store.wallet_for_user(a.id).await.unwrap().unwrap().balance, dec!(60.00));
        assert_eq!(store.wallet_for_user(b.id).await.unwrap().unwrap().balance, dec!(40.00));
        assert_eq!(store.transactions_for_user(b.id, 0, 10).await.unwrap().len(), 1);
    }

    #[sqlx::test]
    async fn test_opposing_transfers_do_not_deadlock_or_overdraw(pool: PgPool) {
        let store = PgLedgerStore::new(pool);
        let (a, a_wallet) = user_with_wallet(&store, "a@example.com").await;
        let (b, b_wallet) = user_with_wallet(&store, "b@example.com").await;
        fund(&store, &a, dec!(10.00)).await;
        fund(&store, &b, dec!(10.00)).await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let (from, to) = if i % 2 == 0 { (a_wallet.id, b_wallet.id) } else { (b_wallet.id, a_wallet.id) };
            handles.push(tokio::spawn(async move { store.transfer(from, to, dec!(3.00)).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let a_balance = store.wallet_for_user(a.id).await.unwrap().unwrap().balance;
        let b_balance = store.wallet_for_user(b.id).await.unwrap().unwrap().balance;
        assert_eq!(a_balance + b_balance, dec!(20.00));
        assert!(a_balance >= Decimal::ZERO && b_balance >= Decimal::ZERO);
    }

    #[sqlx::test]
    async fn test_concurrent_settlement_credits_once(pool: PgPool) {
        let store = PgLedgerStore::new(pool);
        let (user, _) = user_with_wallet(&store, "ada@example.com").await;
        store
            .insert_pending_deposit(&PendingDepositCreateDBRequest {
                receiver_id: user.id,
                amount: dec!(25.00),
                reference: "dep_race".to_string(),
            })
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.settle_deposit("dep_race", Some(dec!(25.00))).await }));
        }
        let mut credited = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                SettleOutcome::Credited { .. } => credited += 1,
                SettleOutcome::AlreadySettled(_) => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(credited, 1);
        assert_eq!(store.wallet_for_user(user.id).await.unwrap().unwrap().balance, dec!(25.00));
        assert!(store.fail_deposit("dep_race").await.unwrap().unwrap().status == TransactionStatus::Success);
    }

    #[sqlx::test]
    async fn test_settlement_rejects_amount_mismatch(pool: PgPool) {
        let store = PgLedgerStore::new(pool);
        let (user, _) = user_with_wallet(&store, "ada@example.com").await;
        store
            .insert_pending_deposit(&PendingDepositCreateDBRequest {
                receiver_id: user.id,
                amount: dec!(25.00),
                reference: "dep_short".to_string(),
            })
            .await
            .unwrap();

        let outcome = store.settle_deposit("dep_short", Some(dec!(2.50))).await.unwrap();
        assert!(matches!(outcome, SettleOutcome::AmountMismatch { notified, .. } if notified == dec!(2.50)));
        assert_eq!(store.settle_deposit("dep_missing", None).await.unwrap(), SettleOutcome::UnknownReference);

        let pending = store.transaction_by_reference("dep_short").await.unwrap().unwrap();
        assert_eq!(pending.status, TransactionStatus::Pending);
        assert_eq!(store.wallet_for_user(user.id).await.unwrap().unwrap().balance, Decimal::ZERO);
    }

    #[sqlx::test]
    async fn test_concurrent_key_issue_respects_quota(pool: PgPool) {
        let ledger = PgLedgerStore::new(pool.clone());
        let store = PgCredentialStore::new(pool);
        let (user, _) = user_with_wallet(&ledger, "ada@example.com").await;
        let expires_at = Utc::now() + Duration::days(1);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            let request = key_request(user.id, expires_at);
            handles.push(tokio::spawn(async move {
                store.insert_key_within_quota(&request, 5, Utc::now()).await
            }));
        }
        let mut issued = 0;
        for handle in handles {
            if let IssueOutcome::Issued(_) = handle.await.unwrap().unwrap() {
                issued += 1;
            }
        }

        assert_eq!(issued, 5);
        assert_eq!(store.active_keys_for_user(user.id, Utc::now()).await.unwrap().len(), 5);
    }

    #[sqlx::test]
    async fn test_rollover_is_undone_when_quota_is_full(pool: PgPool) {
        let ledger = PgLedgerStore::new(pool.clone());
        let store = PgCredentialStore::new(pool);
        let (user, _) = user_with_wallet(&ledger, "ada@example.com").await;
        let now = Utc::now();

        let IssueOutcome::Issued(expired) = store
            .insert_key_within_quota(&key_request(user.id, now - Duration::hours(1)), 5, now)
            .await
            .unwrap()
        else {
            panic!("expired key should not count against the quota");
        };
        for _ in 0..5 {
            store
                .insert_key_within_quota(&key_request(user.id, now + Duration::days(1)), 5, now)
                .await
                .unwrap();
        }

        let replacement = ApiKeyRolloverDBRequest {
            hashed_secret: "$argon2id$replacement".to_string(),
            lookup_hint: "replacem".to_string(),
            expires_at: now + Duration::days(30),
        };
        let outcome = store.rollover_key(expired.id, user.id, &replacement, 5, now).await.unwrap();
        assert_eq!(outcome, RolloverOutcome::QuotaExceeded { active: 5 });
        assert!(!store.get_key(expired.id).await.unwrap().unwrap().is_revoked);

        let Some(active) = store.active_keys_for_user(user.id, now).await.unwrap().pop() else {
            panic!("expected active keys");
        };
        store.revoke_key(active.id, user.id).await.unwrap();

        let outcome = store.rollover_key(expired.id, user.id, &replacement, 5, now).await.unwrap();
        let RolloverOutcome::RolledOver { revoked, issued } = outcome else {
            panic!("expected a rollover, got {outcome:?}");
        };
        assert_eq!(revoked, expired.id);
        assert_eq!(issued.permissions, vec![KeyPermission::Read]);
        assert!(store.get_key(expired.id).await.unwrap().unwrap().is_revoked);
        assert_eq!(
            store.rollover_key(expired.id, user.id, &replacement, 5, now).await.unwrap(),
            RolloverOutcome::AlreadyRevoked
        );
    }
}
