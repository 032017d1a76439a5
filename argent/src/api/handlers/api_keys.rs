//! API key management. Session-authenticated only: a key can never manage keys.

use crate::{
    AppState,
    api::models::api_keys::{ApiKeyCreate, ApiKeyInfoResponse, ApiKeyResponse, ApiKeyRollover},
    auth::current_user::CurrentUser,
    errors::Result,
    keys::KeyCreateRequest,
    types::ApiKeyId,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;

/// Create an API key for the current user.
///
/// This is the only time the plaintext key is returned.
pub async fn create_api_key(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(data): Json<ApiKeyCreate>,
) -> Result<(StatusCode, Json<ApiKeyResponse>)> {
    let issued = state.keys.create(current_user.id, &KeyCreateRequest::from(data)).await?;
    Ok((StatusCode::CREATED, Json(ApiKeyResponse::from(issued))))
}

/// Replace an expired key with a new one that keeps its name and permissions.
pub async fn rollover_api_key(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(data): Json<ApiKeyRollover>,
) -> Result<(StatusCode, Json<ApiKeyResponse>)> {
    let issued = state
        .keys
        .rollover(current_user.id, data.expired_key_id, &data.expiry)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiKeyResponse::from(issued))))
}

pub async fn revoke_api_key(
    State(state): State<AppState>,
    Path(key_id): Path<ApiKeyId>,
    current_user: CurrentUser,
) -> Result<Json<ApiKeyInfoResponse>> {
    let key = state.keys.revoke(current_user.id, key_id).await?;
    Ok(Json(ApiKeyInfoResponse::new(key, Utc::now())))
}

/// List the current user's keys, newest first. Never contains key material.
pub async fn list_api_keys(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<Vec<ApiKeyInfoResponse>>> {
    let now = Utc::now();
    let keys = state.keys.list(current_user.id).await?;
    Ok(Json(keys.into_iter().map(|k| ApiKeyInfoResponse::new(k, now)).collect()))
}
