//! API key lifecycle: issuance, validation, revocation and rollover.
//!
//! Keys are bearer credentials of the form `sk_live_<64 url-safe chars>`. The plaintext is
//! returned exactly once from [`KeyLifecycleManager::create`] or [`KeyLifecycleManager::rollover`];
//! only an Argon2id hash is persisted. A key authorizes an action only while it is active
//! (neither revoked nor past `expires_at`) and only for the permissions it was created with.
//!
//! A user may hold at most `max_active` active keys. The count-then-insert is serialized per user
//! inside the [`CredentialStore`], so concurrent creations cannot overshoot the quota.

use crate::auth::password::{self, Argon2Params, HashError};
use crate::crypto;
use crate::db::errors::DbError;
use crate::db::models::api_keys::{ApiKey, ApiKeyCreateDBRequest, ApiKeyRolloverDBRequest, KeyPermission, UnknownPermission};
use crate::db::store::{CredentialStore, IssueOutcome, RevokeOutcome, RolloverOutcome};
use crate::types::{abbrev_uuid, ApiKeyId, UserId};
use chrono::{DateTime, Duration, Months, Utc};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Default number of simultaneously active keys per user.
pub const DEFAULT_MAX_ACTIVE_KEYS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("you already have {limit} active API keys")]
    QuotaExceeded { limit: usize },

    #[error(transparent)]
    InvalidPermission(#[from] UnknownPermission),

    #[error("at least one permission is required")]
    NoPermissions,

    #[error("invalid expiry '{0}', expected one of 1H, 1D, 1M, 1Y")]
    InvalidExpiry(String),

    #[error("key name must not be empty")]
    InvalidName,

    #[error("invalid API key")]
    InvalidKey,

    #[error("API key lacks the '{required}' permission")]
    InsufficientPermission { required: KeyPermission },

    #[error("API key {0} not found")]
    KeyNotFound(ApiKeyId),

    #[error("API key belongs to another user")]
    Unauthorized,

    #[error("API key being rolled over hasn't expired yet (expires at {expires_at})")]
    NotExpired { expires_at: DateTime<Utc> },

    #[error("API key was already revoked and cannot be rolled over again")]
    AlreadyRevoked,

    #[error(transparent)]
    Hashing(#[from] HashError),

    #[error("{operation} task failed: {source}")]
    Blocking {
        operation: &'static str,
        source: tokio::task::JoinError,
    },

    #[error(transparent)]
    Store(#[from] DbError),
}

/// Symbolic key lifetime accepted by create and rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExpiry {
    OneHour,
    OneDay,
    OneMonth,
    OneYear,
}

impl FromStr for KeyExpiry {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1H" => Ok(KeyExpiry::OneHour),
            "1D" => Ok(KeyExpiry::OneDay),
            "1M" => Ok(KeyExpiry::OneMonth),
            "1Y" => Ok(KeyExpiry::OneYear),
            other => Err(KeyError::InvalidExpiry(other.to_string())),
        }
    }
}

impl KeyExpiry {
    /// Absolute expiry from `now`. Months and years are calendar arithmetic, clamped to the last
    /// day of a shorter month (Jan 31 + 1M = Feb 28/29).
    pub fn expires_at(self, now: DateTime<Utc>) -> Result<DateTime<Utc>, KeyError> {
        let expires_at = match self {
            KeyExpiry::OneHour => now.checked_add_signed(Duration::hours(1)),
            KeyExpiry::OneDay => now.checked_add_signed(Duration::days(1)),
            KeyExpiry::OneMonth => now.checked_add_months(Months::new(1)),
            KeyExpiry::OneYear => now.checked_add_months(Months::new(12)),
        };
        expires_at.ok_or_else(|| KeyError::InvalidExpiry(format!("{self:?} overflows from {now}")))
    }
}

/// Parameters for a new key as supplied by the caller.
#[derive(Debug, Clone)]
pub struct KeyCreateRequest {
    pub name: String,
    pub permissions: Vec<String>,
    pub expiry: String,
}

/// A freshly issued key. `secret` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub key: ApiKey,
    pub secret: String,
}

/// Parse and deduplicate permission names. Any unknown name rejects the whole set.
pub fn parse_permissions<S: AsRef<str>>(raw: &[S]) -> Result<Vec<KeyPermission>, KeyError> {
    let permissions = raw
        .iter()
        .map(|p| p.as_ref().parse::<KeyPermission>())
        .collect::<Result<BTreeSet<_>, _>>()?;
    if permissions.is_empty() {
        return Err(KeyError::NoPermissions);
    }
    Ok(permissions.into_iter().collect())
}

pub struct KeyLifecycleManager {
    store: Arc<dyn CredentialStore>,
    max_active: usize,
    argon2: Argon2Params,
}

impl KeyLifecycleManager {
    pub fn new(store: Arc<dyn CredentialStore>, max_active: usize, argon2: Argon2Params) -> Self {
        Self {
            store,
            max_active,
            argon2,
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Generate a key and its hash. Argon2 runs on a blocking thread so it never stalls the
    /// async workers.
    async fn new_secret(&self) -> Result<(String, String, String), KeyError> {
        let secret = crypto::generate_api_key();
        let hint = crypto::lookup_hint(&secret).ok_or(KeyError::InvalidKey)?.to_string();

        let to_hash = secret.clone();
        let params = self.argon2;
        let hashed = tokio::task::spawn_blocking(move || password::hash_secret(&to_hash, params))
            .await
            .map_err(|source| KeyError::Blocking {
                operation: "API key hashing",
                source,
            })??;
        Ok((secret, hint, hashed))
    }

    /// Issue a new key for `owner`.
    ///
    /// The quota is checked first so a user at the limit learns that before fixing other input.
    /// That early check is advisory; the authoritative one happens atomically with the insert.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&owner), name = %request.name), err)]
    pub async fn create(&self, owner: UserId, request: &KeyCreateRequest) -> Result<IssuedKey, KeyError> {
        let now = Utc::now();
        if self.store.active_keys_for_user(owner, now).await?.len() >= self.max_active {
            return Err(KeyError::QuotaExceeded { limit: self.max_active });
        }

        let name = request.name.trim();
        if name.is_empty() {
            return Err(KeyError::InvalidName);
        }
        let permissions = parse_permissions(&request.permissions)?;
        let expires_at = request.expiry.parse::<KeyExpiry>()?.expires_at(now)?;

        let (secret, lookup_hint, hashed_secret) = self.new_secret().await?;
        let db_request = ApiKeyCreateDBRequest {
            user_id: owner,
            name: name.to_string(),
            hashed_secret,
            lookup_hint,
            permissions,
            expires_at,
        };

        match self.store.insert_key_within_quota(&db_request, self.max_active, now).await? {
            IssueOutcome::Issued(key) => {
                info!(key_id = %abbrev_uuid(&key.id), %expires_at, "Issued API key");
                Ok(IssuedKey { key, secret })
            }
            IssueOutcome::QuotaExceeded { active } => {
                warn!(active, limit = self.max_active, "API key quota reached during creation");
                Err(KeyError::QuotaExceeded { limit: self.max_active })
            }
        }
    }

    /// Authenticate a presented key and check it carries `required`.
    ///
    /// When `owner` is known (for example from a session) only that user's keys are candidates.
    /// Candidates are always restricted to active keys at the store, and each is checked with the
    /// Argon2 verifier rather than by comparing hash strings.
    #[instrument(skip_all, fields(required = %required), err)]
    pub async fn validate(&self, plaintext: &str, owner: Option<UserId>, required: KeyPermission) -> Result<ApiKey, KeyError> {
        let hint = crypto::lookup_hint(plaintext).ok_or(KeyError::InvalidKey)?;
        let candidates = self.store.active_keys_by_hint(hint, Utc::now()).await?;

        let mut matched = None;
        for candidate in candidates.into_iter().filter(|k| owner.is_none_or(|o| k.user_id == o)) {
            let presented = plaintext.to_string();
            let stored = candidate.hashed_secret.clone();
            let verified = tokio::task::spawn_blocking(move || password::verify_secret(&presented, &stored))
                .await
                .map_err(|source| KeyError::Blocking {
                    operation: "API key verification",
                    source,
                })?;
            match verified {
                Ok(true) => {
                    matched = Some(candidate);
                    break;
                }
                Ok(false) => {}
                Err(e) => error!(key_id = %abbrev_uuid(&candidate.id), "Stored API key hash is unreadable: {e}"),
            }
        }

        let key = matched.ok_or(KeyError::InvalidKey)?;
        if !key.has_permission(required) {
            return Err(KeyError::InsufficientPermission { required });
        }
        Ok(key)
    }

    /// Revoke a key. Revoking an already revoked key succeeds without change.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&owner), key_id = %abbrev_uuid(&key_id)), err)]
    pub async fn revoke(&self, owner: UserId, key_id: ApiKeyId) -> Result<ApiKey, KeyError> {
        match self.store.revoke_key(key_id, owner).await? {
            RevokeOutcome::Revoked(key) => {
                info!("Revoked API key");
                Ok(key)
            }
            RevokeOutcome::AlreadyRevoked(key) => Ok(key),
            RevokeOutcome::NotOwner => Err(KeyError::Unauthorized),
            RevokeOutcome::NotFound => Err(KeyError::KeyNotFound(key_id)),
        }
    }

    /// Replace an expired key with a new one carrying the same name and permissions.
    ///
    /// Revocation of the old key and insertion of the new one are one unit; if the quota blocks
    /// the insert the old key is left exactly as it was.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&owner), key_id = %abbrev_uuid(&key_id)), err)]
    pub async fn rollover(&self, owner: UserId, key_id: ApiKeyId, expiry: &str) -> Result<IssuedKey, KeyError> {
        let now = Utc::now();
        let expires_at = expiry.parse::<KeyExpiry>()?.expires_at(now)?;
        let (secret, lookup_hint, hashed_secret) = self.new_secret().await?;
        let replacement = ApiKeyRolloverDBRequest {
            hashed_secret,
            lookup_hint,
            expires_at,
        };

        match self
            .store
            .rollover_key(key_id, owner, &replacement, self.max_active, now)
            .await?
        {
            RolloverOutcome::RolledOver { revoked, issued } => {
                info!(revoked = %abbrev_uuid(&revoked), issued = %abbrev_uuid(&issued.id), "Rolled over API key");
                Ok(IssuedKey { key: issued, secret })
            }
            RolloverOutcome::NotFound => Err(KeyError::KeyNotFound(key_id)),
            RolloverOutcome::NotOwner => Err(KeyError::Unauthorized),
            RolloverOutcome::NotExpired { expires_at } => Err(KeyError::NotExpired { expires_at }),
            RolloverOutcome::AlreadyRevoked => Err(KeyError::AlreadyRevoked),
            RolloverOutcome::QuotaExceeded { .. } => Err(KeyError::QuotaExceeded { limit: self.max_active }),
        }
    }

    /// All keys the user created, newest first. Hashes are never exposed past the API layer.
    pub async fn list(&self, owner: UserId) -> Result<Vec<ApiKey>, KeyError> {
        Ok(self.store.keys_for_user(owner).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::in_memory::InMemoryCredentialStore;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn manager() -> (KeyLifecycleManager, InMemoryCredentialStore) {
        let store = InMemoryCredentialStore::new();
        let manager = KeyLifecycleManager::new(
            Arc::new(store.clone()),
            DEFAULT_MAX_ACTIVE_KEYS,
            Argon2Params::insecure_for_tests(),
        );
        (manager, store)
    }

    fn request(permissions: &[&str], expiry: &str) -> KeyCreateRequest {
        KeyCreateRequest {
            name: "billing".to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            expiry: expiry.to_string(),
        }
    }

    /// Insert an already expired key directly, bypassing `create`'s expiry codes.
    async fn insert_expired(store: &InMemoryCredentialStore, owner: UserId) -> (ApiKey, String) {
        let secret = crypto::generate_api_key();
        let request = ApiKeyCreateDBRequest {
            user_id: owner,
            name: "expired".to_string(),
            hashed_secret: password::hash_secret(&secret, Argon2Params::insecure_for_tests()).unwrap(),
            lookup_hint: crypto::lookup_hint(&secret).unwrap().to_string(),
            permissions: vec![KeyPermission::Read, KeyPermission::Transfer],
            expires_at: Utc::now() - Duration::minutes(5),
        };
        match store.insert_key_within_quota(&request, 5, Utc::now()).await.unwrap() {
            IssueOutcome::Issued(key) => (key, secret),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_expiry_codes() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();

        assert_eq!("1H".parse::<KeyExpiry>().unwrap().expires_at(now).unwrap(), now + Duration::hours(1));
        assert_eq!("1D".parse::<KeyExpiry>().unwrap().expires_at(now).unwrap(), now + Duration::days(1));
        assert_eq!(
            "1M".parse::<KeyExpiry>().unwrap().expires_at(now).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap()
        );
        assert_eq!(
            "1Y".parse::<KeyExpiry>().unwrap().expires_at(now).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap()
        );

        for bad in ["1h", "2D", "", "1W", "1 Y"] {
            assert!(matches!(bad.parse::<KeyExpiry>(), Err(KeyError::InvalidExpiry(_))), "{bad}");
        }
    }

    #[test]
    fn test_parse_permissions_dedupes_and_rejects_unknown() {
        assert_eq!(
            parse_permissions(&["read", "transfer", "read"]).unwrap(),
            vec![KeyPermission::Transfer, KeyPermission::Read]
        );
        assert!(matches!(parse_permissions(&["read", "admin"]), Err(KeyError::InvalidPermission(_))));
        assert!(matches!(parse_permissions::<&str>(&[]), Err(KeyError::NoPermissions)));
    }

    #[tokio::test]
    async fn test_create_returns_plaintext_once_and_stores_hash() {
        let (manager, store) = manager();
        let owner = Uuid::new_v4();

        let issued = manager.create(owner, &request(&["read"], "1D")).await.unwrap();

        assert!(issued.secret.starts_with("sk_live_"));
        let stored = store.get_key(issued.key.id).await.unwrap().unwrap();
        assert_ne!(stored.hashed_secret, issued.secret);
        assert!(!stored.hashed_secret.contains(&issued.secret));
        assert_eq!(stored.name, "billing");
        assert!(stored.expires_at > Utc::now() + Duration::hours(23));
    }

    #[tokio::test]
    async fn test_invalid_input_has_no_side_effects() {
        let (manager, store) = manager();
        let owner = Uuid::new_v4();

        let err = manager.create(owner, &request(&["read", "withdraw"], "1D")).await.unwrap_err();
        assert!(matches!(err, KeyError::InvalidPermission(_)));

        let err = manager.create(owner, &request(&["read"], "7D")).await.unwrap_err();
        assert!(matches!(err, KeyError::InvalidExpiry(_)));

        let err = manager
            .create(
                owner,
                &KeyCreateRequest {
                    name: "   ".to_string(),
                    ..request(&["read"], "1D")
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::InvalidName));

        assert!(store.keys_for_user(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sixth_key_exceeds_quota() {
        let (manager, _) = manager();
        let owner = Uuid::new_v4();

        for _ in 0..5 {
            manager.create(owner, &request(&["read"], "1H")).await.unwrap();
        }
        let err = manager.create(owner, &request(&["read"], "1H")).await.unwrap_err();
        assert!(matches!(err, KeyError::QuotaExceeded { limit: 5 }));

        // quota is per user
        manager.create(Uuid::new_v4(), &request(&["read"], "1H")).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_quota_holds_under_concurrent_creation() {
        let (manager, store) = manager();
        let manager = Arc::new(manager);
        let owner = Uuid::new_v4();

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.create(owner, &request(&["read"], "1D")).await })
            })
            .collect();

        let mut created = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(KeyError::QuotaExceeded { .. }) => rejected += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }

        assert_eq!(created, 5);
        assert_eq!(rejected, 7);
        assert_eq!(store.active_keys_for_user(owner, Utc::now()).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_revoked_and_expired_keys_free_quota() {
        let (manager, _) = manager();
        let owner = Uuid::new_v4();

        let mut first = None;
        for _ in 0..5 {
            first.get_or_insert(manager.create(owner, &request(&["read"], "1H")).await.unwrap());
        }
        manager.revoke(owner, first.unwrap().key.id).await.unwrap();

        manager.create(owner, &request(&["read"], "1H")).await.unwrap();
    }

    #[tokio::test]
    async fn test_permission_enforcement() {
        let (manager, _) = manager();
        let owner = Uuid::new_v4();
        let issued = manager.create(owner, &request(&["read"], "1D")).await.unwrap();

        let key = manager.validate(&issued.secret, Some(owner), KeyPermission::Read).await.unwrap();
        assert_eq!(key.id, issued.key.id);

        let err = manager
            .validate(&issued.secret, Some(owner), KeyPermission::Transfer)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::InsufficientPermission { required: KeyPermission::Transfer }));
    }

    #[tokio::test]
    async fn test_validate_rejects_unknown_and_foreign_keys() {
        let (manager, _) = manager();
        let owner = Uuid::new_v4();
        let issued = manager.create(owner, &request(&["read"], "1D")).await.unwrap();

        // looked up without an owner the key resolves to its user
        let key = manager.validate(&issued.secret, None, KeyPermission::Read).await.unwrap();
        assert_eq!(key.user_id, owner);

        let err = manager
            .validate(&issued.secret, Some(Uuid::new_v4()), KeyPermission::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::InvalidKey));

        // same hint, different body
        let mut tampered = issued.secret.clone();
        tampered.pop();
        tampered.push(if issued.secret.ends_with('A') { 'B' } else { 'A' });
        assert!(matches!(
            manager.validate(&tampered, None, KeyPermission::Read).await,
            Err(KeyError::InvalidKey)
        ));

        assert!(matches!(
            manager.validate("not-a-key", None, KeyPermission::Read).await,
            Err(KeyError::InvalidKey)
        ));
    }

    #[tokio::test]
    async fn test_revoked_key_fails_validation() {
        let (manager, _) = manager();
        let owner = Uuid::new_v4();
        let issued = manager.create(owner, &request(&["deposit"], "1D")).await.unwrap();

        manager.revoke(owner, issued.key.id).await.unwrap();
        // idempotent
        manager.revoke(owner, issued.key.id).await.unwrap();

        assert!(matches!(
            manager.validate(&issued.secret, Some(owner), KeyPermission::Deposit).await,
            Err(KeyError::InvalidKey)
        ));
    }

    #[tokio::test]
    async fn test_revoke_requires_owner() {
        let (manager, _) = manager();
        let owner = Uuid::new_v4();
        let issued = manager.create(owner, &request(&["read"], "1D")).await.unwrap();

        assert!(matches!(
            manager.revoke(Uuid::new_v4(), issued.key.id).await,
            Err(KeyError::Unauthorized)
        ));
        assert!(matches!(
            manager.revoke(owner, Uuid::new_v4()).await,
            Err(KeyError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_key_fails_validation() {
        let (manager, store) = manager();
        let owner = Uuid::new_v4();
        let (_, secret) = insert_expired(&store, owner).await;

        assert!(matches!(
            manager.validate(&secret, Some(owner), KeyPermission::Read).await,
            Err(KeyError::InvalidKey)
        ));
    }

    #[tokio::test]
    async fn test_rollover_of_active_key_is_not_expired() {
        let (manager, _) = manager();
        let owner = Uuid::new_v4();
        let issued = manager.create(owner, &request(&["read"], "1D")).await.unwrap();

        let err = manager.rollover(owner, issued.key.id, "1D").await.unwrap_err();
        assert!(matches!(err, KeyError::NotExpired { .. }));

        // a revoked but unexpired key is still not expired
        manager.revoke(owner, issued.key.id).await.unwrap();
        let err = manager.rollover(owner, issued.key.id, "1D").await.unwrap_err();
        assert!(matches!(err, KeyError::NotExpired { .. }));
    }

    #[tokio::test]
    async fn test_rollover_reissues_with_same_scope() {
        let (manager, store) = manager();
        let owner = Uuid::new_v4();
        let (old, old_secret) = insert_expired(&store, owner).await;

        let issued = manager.rollover(owner, old.id, "1M").await.unwrap();

        assert_ne!(issued.key.id, old.id);
        assert_eq!(issued.key.name, old.name);
        assert_eq!(issued.key.permissions, old.permissions);
        assert!(issued.key.is_active(Utc::now()));
        assert!(store.get_key(old.id).await.unwrap().unwrap().is_revoked);

        manager
            .validate(&issued.secret, Some(owner), KeyPermission::Transfer)
            .await
            .unwrap();
        assert!(matches!(
            manager.validate(&old_secret, Some(owner), KeyPermission::Read).await,
            Err(KeyError::InvalidKey)
        ));

        // one expired key yields one replacement
        assert!(matches!(
            manager.rollover(owner, old.id, "1M").await,
            Err(KeyError::AlreadyRevoked)
        ));
    }

    #[tokio::test]
    async fn test_rollover_checks_ownership_and_existence() {
        let (manager, store) = manager();
        let owner = Uuid::new_v4();
        let (old, _) = insert_expired(&store, owner).await;

        assert!(matches!(
            manager.rollover(Uuid::new_v4(), old.id, "1D").await,
            Err(KeyError::Unauthorized)
        ));
        assert!(matches!(
            manager.rollover(owner, Uuid::new_v4(), "1D").await,
            Err(KeyError::KeyNotFound(_))
        ));
        assert!(!store.get_key(old.id).await.unwrap().unwrap().is_revoked);
    }

    #[tokio::test]
    async fn test_rollover_blocked_by_quota_keeps_old_key() {
        let (manager, store) = manager();
        let owner = Uuid::new_v4();
        let (old, _) = insert_expired(&store, owner).await;
        for _ in 0..5 {
            manager.create(owner, &request(&["read"], "1D")).await.unwrap();
        }

        let err = manager.rollover(owner, old.id, "1D").await.unwrap_err();
        assert!(matches!(err, KeyError::QuotaExceeded { limit: 5 }));
        assert!(!store.get_key(old.id).await.unwrap().unwrap().is_revoked);
        assert_eq!(store.active_keys_for_user(owner, Utc::now()).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_list_includes_inactive_keys() {
        let (manager, store) = manager();
        let owner = Uuid::new_v4();
        insert_expired(&store, owner).await;
        let issued = manager.create(owner, &request(&["read"], "1D")).await.unwrap();

        let keys = manager.list(owner).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].id, issued.key.id);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_hashing_leaves_the_runtime_free() {
        let (manager, _) = manager();
        let owner = Uuid::new_v4();
        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let counter = ticks.clone();
        let ticker = tokio::spawn(async move {
            loop {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::task::yield_now().await;
            }
        });

        // The in-memory store never suspends, so the ticker only runs if hashing does
        let issued = manager.create(owner, &request(&["read"], "1D")).await.unwrap();
        let after_create = ticks.load(std::sync::atomic::Ordering::SeqCst);
        assert!(after_create > 0, "key creation hashed on the runtime thread");

        manager.validate(&issued.secret, None, KeyPermission::Read).await.unwrap();
        ticker.abort();
        assert!(
            ticks.load(std::sync::atomic::Ordering::SeqCst) > after_create,
            "key validation verified on the runtime thread"
        );
    }
}
