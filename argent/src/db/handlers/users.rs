use crate::db::errors::Result;
use crate::db::models::users::{User, UserCreateDBRequest};
use crate::types::{abbrev_uuid, UserId};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, google_id, first_name, last_name, created_at";

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn get(&mut self, id: UserId) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, google_id), err)]
    pub async fn get_by_google_id(&mut self, google_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE google_id = $1"))
            .bind(google_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    /// Insert the user unless the email or Google account is already registered. Returns `None` on
    /// conflict so the caller can fall back to the existing row without aborting its transaction.
    #[instrument(skip(self, request), fields(email = %request.email), err)]
    pub async fn create_if_absent(&mut self, request: &UserCreateDBRequest) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, google_id, first_name, last_name)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT DO NOTHING
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&request.email)
        .bind(&request.google_id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(user)
    }
}
