use crate::db::errors::{DbError, Result};
use crate::db::models::api_keys::{ApiKey, ApiKeyCreateDBRequest, KeyPermission};
use crate::types::{abbrev_uuid, ApiKeyId, UserId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;
use uuid::Uuid;

const API_KEY_COLUMNS: &str = "id, user_id, name, hashed_secret, lookup_hint, permissions, expires_at, is_revoked, created_at";

// Database entity model; permissions are stored as TEXT[]
#[derive(Debug, Clone, FromRow)]
struct ApiKeyRow {
    id: ApiKeyId,
    user_id: UserId,
    name: String,
    hashed_secret: String,
    lookup_hint: String,
    permissions: Vec<String>,
    expires_at: DateTime<Utc>,
    is_revoked: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ApiKeyRow> for ApiKey {
    type Error = DbError;

    fn try_from(row: ApiKeyRow) -> Result<Self> {
        let permissions = row
            .permissions
            .iter()
            .map(|p| p.parse::<KeyPermission>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DbError::Other(anyhow::anyhow!("api key {} has corrupt permissions: {e}", row.id)))?;

        Ok(ApiKey {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            hashed_secret: row.hashed_secret,
            lookup_hint: row.lookup_hint,
            permissions,
            expires_at: row.expires_at,
            is_revoked: row.is_revoked,
            created_at: row.created_at,
        })
    }
}

fn into_keys(rows: Vec<ApiKeyRow>) -> Result<Vec<ApiKey>> {
    rows.into_iter().map(ApiKey::try_from).collect()
}

pub struct ApiKeys<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ApiKeys<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Take the per-user transaction-scoped advisory lock that serializes quota checks.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn lock_owner(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn count_active(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM api_keys WHERE user_id = $1 AND NOT is_revoked AND expires_at > $2",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), name = %request.name), err)]
    pub async fn insert(&mut self, request: &ApiKeyCreateDBRequest) -> Result<ApiKey> {
        let permissions: Vec<&str> = request.permissions.iter().map(|p| p.as_str()).collect();

        let row = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "INSERT INTO api_keys (id, user_id, name, hashed_secret, lookup_hint, permissions, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {API_KEY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.name)
        .bind(&request.hashed_secret)
        .bind(&request.lookup_hint)
        .bind(&permissions)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;
        row.try_into()
    }

    #[instrument(skip(self), fields(key_id = %abbrev_uuid(&id)), err)]
    pub async fn get(&mut self, id: ApiKeyId) -> Result<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(&format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        row.map(ApiKey::try_from).transpose()
    }

    #[instrument(skip(self), fields(key_id = %abbrev_uuid(&id)), err)]
    pub async fn get_for_update(&mut self, id: ApiKeyId) -> Result<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(&format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        row.map(ApiKey::try_from).transpose()
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn active_for_user(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys
             WHERE user_id = $1 AND NOT is_revoked AND expires_at > $2
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&mut *self.db)
        .await?;
        into_keys(rows)
    }

    #[instrument(skip(self, lookup_hint), err)]
    pub async fn active_by_hint(&mut self, lookup_hint: &str, now: DateTime<Utc>) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys
             WHERE lookup_hint = $1 AND NOT is_revoked AND expires_at > $2"
        ))
        .bind(lookup_hint)
        .bind(now)
        .fetch_all(&mut *self.db)
        .await?;
        into_keys(rows)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;
        into_keys(rows)
    }

    #[instrument(skip(self), fields(key_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_revoked(&mut self, id: ApiKeyId) -> Result<ApiKey> {
        let row = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "UPDATE api_keys SET is_revoked = TRUE WHERE id = $1 RETURNING {API_KEY_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;
        row.ok_or(DbError::NotFound)?.try_into()
    }
}
