//! In-memory storage implementations.
//!
//! Suitable for tests and single-process development runs; everything is lost on restart.
//! Each store keeps its whole state behind one [`parking_lot::Mutex`] and holds the lock for the
//! full duration of a call, which gives every trait method the same all-or-nothing behaviour the
//! PostgreSQL stores get from database transactions. The lock is never held across an `.await`.

use crate::db::errors::{DbError, Result};
use crate::db::models::{
    api_keys::{ApiKey, ApiKeyCreateDBRequest, ApiKeyRolloverDBRequest},
    transactions::{PendingDepositCreateDBRequest, Transaction, TransactionKind, TransactionStatus},
    users::{User, UserCreateDBRequest},
    wallets::Wallet,
};
use crate::db::store::{
    CredentialStore, IssueOutcome, LedgerStore, RevokeOutcome, RolloverOutcome, SettleOutcome, TransferOutcome,
};
use crate::types::{ApiKeyId, UserId, WalletId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct LedgerState {
    users: HashMap<UserId, User>,
    wallets: HashMap<WalletId, Wallet>,
    // insertion order doubles as creation order for listing
    transactions: Vec<Transaction>,
}

impl LedgerState {
    fn wallet_of(&self, user_id: UserId) -> Option<&Wallet> {
        self.wallets.values().find(|w| w.user_id == user_id)
    }

    fn deposit_index(&self, reference: &str) -> Option<usize> {
        self.transactions
            .iter()
            .position(|t| t.reference.as_deref() == Some(reference))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_or_create_user(&self, request: &UserCreateDBRequest) -> Result<(User, Wallet)> {
        let mut state = self.state.lock();

        // A known Google account wins over the email it signs in with
        let by_google = request
            .google_id
            .as_deref()
            .and_then(|google_id| state.users.values().find(|u| u.google_id.as_deref() == Some(google_id)));
        let existing = by_google.or_else(|| state.users.values().find(|u| u.email == request.email)).cloned();
        if let Some(user) = existing {
            let wallet = state.wallet_of(user.id).cloned().ok_or(DbError::NotFound)?;
            return Ok((user, wallet));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: request.email.clone(),
            google_id: request.google_id.clone(),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            created_at: now,
        };
        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id: user.id,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        state.wallets.insert(wallet.id, wallet.clone());
        Ok((user, wallet))
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.state.lock().users.get(&user_id).cloned())
    }

    async fn wallet_for_user(&self, user_id: UserId) -> Result<Option<Wallet>> {
        Ok(self.state.lock().wallet_of(user_id).cloned())
    }

    async fn resolve_wallet(&self, identifier: Uuid) -> Result<Option<Wallet>> {
        let state = self.state.lock();
        Ok(state
            .wallets
            .get(&identifier)
            .or_else(|| state.wallet_of(identifier))
            .cloned())
    }

    async fn transfer(&self, from: WalletId, to: WalletId, amount: Decimal) -> Result<TransferOutcome> {
        let mut state = self.state.lock();

        let sender = state.wallets.get(&from).ok_or(DbError::NotFound)?;
        let receiver = state.wallets.get(&to).ok_or(DbError::NotFound)?;
        if sender.balance < amount {
            return Ok(TransferOutcome::InsufficientFunds {
                available: sender.balance,
            });
        }
        let (sender_user, receiver_user) = (sender.user_id, receiver.user_id);

        let now = Utc::now();
        for (id, delta) in [(from, -amount), (to, amount)] {
            if let Some(wallet) = state.wallets.get_mut(&id) {
                wallet.balance += delta;
                wallet.updated_at = now;
            }
        }
        let transaction = Transaction {
            id: Uuid::new_v4(),
            sender_id: Some(sender_user),
            receiver_id: receiver_user,
            amount,
            kind: TransactionKind::Transfer,
            status: TransactionStatus::Success,
            reference: None,
            created_at: now,
            updated_at: now,
        };
        state.transactions.push(transaction.clone());
        Ok(TransferOutcome::Committed(transaction))
    }

    async fn insert_pending_deposit(&self, request: &PendingDepositCreateDBRequest) -> Result<Transaction> {
        let mut state = self.state.lock();

        if state.deposit_index(&request.reference).is_some() {
            return Err(DbError::UniqueViolation {
                constraint: Some("transactions_reference_key".to_string()),
                table: Some("transactions".to_string()),
                message: format!("reference {} already exists", request.reference),
            });
        }
        if !state.users.contains_key(&request.receiver_id) {
            return Err(DbError::ForeignKeyViolation {
                constraint: None,
                table: Some("transactions".to_string()),
                message: format!("user {} does not exist", request.receiver_id),
            });
        }

        let now = Utc::now();
        let transaction = Transaction {
            id: Uuid::new_v4(),
            sender_id: None,
            receiver_id: request.receiver_id,
            amount: request.amount,
            kind: TransactionKind::Deposit,
            status: TransactionStatus::Pending,
            reference: Some(request.reference.clone()),
            created_at: now,
            updated_at: now,
        };
        state.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn settle_deposit(&self, reference: &str, notified_amount: Option<Decimal>) -> Result<SettleOutcome> {
        let mut state = self.state.lock();

        let Some(index) = state.deposit_index(reference) else {
            return Ok(SettleOutcome::UnknownReference);
        };
        let deposit = state.transactions[index].clone();
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

        let wallet_id = state.wallet_of(deposit.receiver_id).map(|w| w.id).ok_or(DbError::NotFound)?;
        let now = Utc::now();
        let balance = match state.wallets.get_mut(&wallet_id) {
            Some(wallet) => {
                wallet.balance += deposit.amount;
                wallet.updated_at = now;
                wallet.balance
            }
            None => return Err(DbError::NotFound),
        };
        let settled = &mut state.transactions[index];
        settled.status = TransactionStatus::Success;
        settled.updated_at = now;

        Ok(SettleOutcome::Credited {
            transaction: settled.clone(),
            balance,
        })
    }

    async fn fail_deposit(&self, reference: &str) -> Result<Option<Transaction>> {
        let mut state = self.state.lock();

        let Some(index) = state.deposit_index(reference) else {
            return Ok(None);
        };
        let deposit = &mut state.transactions[index];
        if !deposit.status.is_terminal() {
            deposit.status = TransactionStatus::Failed;
            deposit.updated_at = Utc::now();
        }
        Ok(Some(deposit.clone()))
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let state = self.state.lock();
        Ok(state.deposit_index(reference).map(|i| state.transactions[i].clone()))
    }

    async fn transactions_for_user(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<Transaction>> {
        let state = self.state.lock();
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.involves(user_id))
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    keys: Arc<Mutex<Vec<ApiKey>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn count_active(keys: &[ApiKey], user_id: UserId, now: DateTime<Utc>) -> usize {
    keys.iter().filter(|k| k.user_id == user_id && k.is_active(now)).count()
}

fn new_key(request: &ApiKeyCreateDBRequest) -> ApiKey {
    ApiKey {
        id: Uuid::new_v4(),
        user_id: request.user_id,
        name: request.name.clone(),
        hashed_secret: request.hashed_secret.clone(),
        lookup_hint: request.lookup_hint.clone(),
        permissions: request.permissions.clone(),
        expires_at: request.expires_at,
        is_revoked: false,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn insert_key_within_quota(
        &self,
        request: &ApiKeyCreateDBRequest,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> Result<IssueOutcome> {
        let mut keys = self.keys.lock();

        let active = count_active(&keys, request.user_id, now);
        if active >= max_active {
            return Ok(IssueOutcome::QuotaExceeded { active });
        }
        let key = new_key(request);
        keys.push(key.clone());
        Ok(IssueOutcome::Issued(key))
    }

    async fn active_keys_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Vec<ApiKey>> {
        let keys = self.keys.lock();
        Ok(keys
            .iter()
            .rev()
            .filter(|k| k.user_id == user_id && k.is_active(now))
            .cloned()
            .collect())
    }

    async fn active_keys_by_hint(&self, lookup_hint: &str, now: DateTime<Utc>) -> Result<Vec<ApiKey>> {
        let keys = self.keys.lock();
        Ok(keys
            .iter()
            .filter(|k| k.lookup_hint == lookup_hint && k.is_active(now))
            .cloned()
            .collect())
    }

    async fn get_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>> {
        Ok(self.keys.lock().iter().find(|k| k.id == id).cloned())
    }

    async fn keys_for_user(&self, user_id: UserId) -> Result<Vec<ApiKey>> {
        let keys = self.keys.lock();
        Ok(keys.iter().rev().filter(|k| k.user_id == user_id).cloned().collect())
    }

    async fn revoke_key(&self, id: ApiKeyId, owner: UserId) -> Result<RevokeOutcome> {
        let mut keys = self.keys.lock();

        let Some(key) = keys.iter_mut().find(|k| k.id == id) else {
            return Ok(RevokeOutcome::NotFound);
        };
        if key.user_id != owner {
            return Ok(RevokeOutcome::NotOwner);
        }
        if key.is_revoked {
            return Ok(RevokeOutcome::AlreadyRevoked(key.clone()));
        }
        key.is_revoked = true;
        Ok(RevokeOutcome::Revoked(key.clone()))
    }

    async fn rollover_key(
        &self,
        old: ApiKeyId,
        owner: UserId,
        replacement: &ApiKeyRolloverDBRequest,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> Result<RolloverOutcome> {
        let mut keys = self.keys.lock();

        let Some(index) = keys.iter().position(|k| k.id == old) else {
            return Ok(RolloverOutcome::NotFound);
        };
        let existing = keys[index].clone();
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

        keys[index].is_revoked = true;
        let active = count_active(&keys, owner, now);
        if active >= max_active {
            keys[index].is_revoked = false;
            return Ok(RolloverOutcome::QuotaExceeded { active });
        }
        let issued = new_key(&ApiKeyCreateDBRequest {
            user_id: owner,
            name: existing.name,
            hashed_secret: replacement.hashed_secret.clone(),
            lookup_hint: replacement.lookup_hint.clone(),
            permissions: existing.permissions,
            expires_at: replacement.expires_at,
        });
        keys.push(issued.clone());
        Ok(RolloverOutcome::RolledOver { revoked: old, issued })
    }
}
