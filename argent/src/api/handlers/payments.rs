//! Payment gateway webhook.

use crate::{AppState, api::models::wallet::WebhookResponse, errors::Result, payment_providers::signing::SIGNATURE_HEADER};
use axum::{body::Bytes, extract::State, http::HeaderMap, response::Json};

/// Receive a gateway notification.
///
/// The raw body is passed through untouched because the signature covers the exact bytes sent.
/// Duplicates and unrelated events are acknowledged with 200 so the gateway stops retrying.
pub async fn paystack_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookResponse>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = state.deposits()?.reconcile(&body, signature).await?;
    Ok(Json(WebhookResponse::from(outcome)))
}
