//! Request extractors for authenticated callers.
//!
//! - [`CurrentUser`]: session only. Key management routes use this so a leaked API key can never
//!   mint or revoke keys.
//! - [`Authenticated<S>`]: session or API key. A key must carry the permission named by the scope
//!   marker `S`; a session implies every permission.

use crate::{
    AppState,
    auth::session,
    db::models::api_keys::KeyPermission,
    errors::{Error, Result},
    types::{ApiKeyId, UserId, abbrev_uuid},
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use std::marker::PhantomData;
use tracing::{debug, instrument, trace};

/// Header carrying a raw API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The user behind a valid session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
}

/// How a request was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    Session,
    ApiKey(ApiKeyId),
}

/// A permission a route requires from API keys.
pub trait Scope: Send + Sync + 'static {
    const PERMISSION: KeyPermission;
}

#[derive(Debug)]
pub struct DepositScope;
#[derive(Debug)]
pub struct TransferScope;
#[derive(Debug)]
pub struct ReadScope;

impl Scope for DepositScope {
    const PERMISSION: KeyPermission = KeyPermission::Deposit;
}
impl Scope for TransferScope {
    const PERMISSION: KeyPermission = KeyPermission::Transfer;
}
impl Scope for ReadScope {
    const PERMISSION: KeyPermission = KeyPermission::Read;
}

/// A caller allowed to act with scope `S`.
#[derive(Debug)]
pub struct Authenticated<S: Scope> {
    pub user_id: UserId,
    pub credential: Credential,
    _scope: PhantomData<S>,
}

/// Extract the session user from `Authorization: Bearer <jwt>`
/// Returns:
/// - None: no bearer token present
/// - Some(Ok(user)): token verified
/// - Some(Err(error)): token present but invalid or expired
fn try_session_auth(headers: &HeaderMap, state: &AppState) -> Option<Result<UserId>> {
    let header = headers.get(AUTHORIZATION)?;
    let token = match header.to_str() {
        Ok(value) => value.strip_prefix("Bearer ")?,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };
    Some(session::verify_session_token(token.trim(), &state.config.auth))
}

/// Extract and validate an API key from `x-api-key`
async fn try_api_key_auth(headers: &HeaderMap, state: &AppState, required: KeyPermission) -> Option<Result<(UserId, ApiKeyId)>> {
    let header = headers.get(API_KEY_HEADER)?;
    let plaintext = match header.to_str() {
        Ok(value) => value.trim(),
        Err(_) => {
            return Some(Err(Error::InvalidCredential {
                message: "Invalid, expired or revoked API key".to_string(),
            }));
        }
    };

    Some(
        state
            .keys
            .validate(plaintext, None, required)
            .await
            .map(|key| (key.user_id, key.id))
            .map_err(Error::from),
    )
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match try_session_auth(&parts.headers, state) {
            Some(Ok(id)) => {
                debug!(user_id = %abbrev_uuid(&id), "Session authenticated");
                Ok(CurrentUser { id })
            }
            Some(Err(e)) => Err(e),
            None if parts.headers.contains_key(API_KEY_HEADER) => Err(Error::Unauthorized {
                message: "API keys cannot manage API keys; sign in instead".to_string(),
            }),
            None => Err(Error::Unauthenticated { message: None }),
        }
    }
}

impl<S: Scope> FromRequestParts<AppState> for Authenticated<S> {
    type Rejection = Error;

    #[instrument(skip_all, fields(required = %S::PERMISSION))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // An explicit API key wins over a bearer token
        if let Some(result) = try_api_key_auth(&parts.headers, state, S::PERMISSION).await {
            let (user_id, key_id) = result?;
            debug!(user_id = %abbrev_uuid(&user_id), key_id = %abbrev_uuid(&key_id), "API key authenticated");
            return Ok(Self {
                user_id,
                credential: Credential::ApiKey(key_id),
                _scope: PhantomData,
            });
        }

        match try_session_auth(&parts.headers, state) {
            Some(Ok(user_id)) => Ok(Self {
                user_id,
                credential: Credential::Session,
                _scope: PhantomData,
            }),
            Some(Err(e)) => Err(e),
            None => {
                trace!("No credentials found in request");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}
