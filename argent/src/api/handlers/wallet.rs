//! Wallet routes. Each accepts a session or an API key carrying the scope in its extractor type.

use crate::{
    AppState,
    api::models::wallet::{
        BalanceResponse, DepositCallbackQuery, DepositCallbackResponse, DepositCreate, ListTransactionsQuery, TransactionResponse,
        TransferCreate, WalletResponse,
    },
    auth::current_user::{Authenticated, DepositScope, ReadScope, TransferScope},
    errors::Result,
    ledger::{DepositInitiated, DepositStatus},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

/// Start a deposit and return the gateway checkout URL.
pub async fn create_deposit(
    State(state): State<AppState>,
    auth: Authenticated<DepositScope>,
    Json(data): Json<DepositCreate>,
) -> Result<(StatusCode, Json<DepositInitiated>)> {
    let initiated = state.deposits()?.initiate(auth.user_id, data.amount).await?;
    Ok((StatusCode::CREATED, Json(initiated)))
}

pub async fn deposit_status(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    auth: Authenticated<ReadScope>,
) -> Result<Json<DepositStatus>> {
    Ok(Json(state.deposits()?.status(&reference, auth.user_id).await?))
}

/// Ask the gateway for the deposit's state and settle it if the webhook never came.
pub async fn refresh_deposit(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    auth: Authenticated<ReadScope>,
) -> Result<Json<DepositStatus>> {
    Ok(Json(state.deposits()?.refresh(&reference, auth.user_id).await?))
}

/// Where the gateway sends the payer after checkout. Crediting happens via the webhook.
pub async fn deposit_callback(Query(query): Query<DepositCallbackQuery>) -> Json<DepositCallbackResponse> {
    Json(DepositCallbackResponse {
        reference: query.reference,
        message: "Payment received. Your wallet is credited once the payment provider confirms it.".to_string(),
    })
}

pub async fn get_balance(State(state): State<AppState>, auth: Authenticated<ReadScope>) -> Result<Json<BalanceResponse>> {
    let balance = state.transfers.balance(auth.user_id).await?;
    Ok(Json(BalanceResponse { balance }))
}

pub async fn get_wallet(State(state): State<AppState>, auth: Authenticated<ReadScope>) -> Result<Json<WalletResponse>> {
    let wallet = state.transfers.wallet(auth.user_id).await?;
    Ok(Json(WalletResponse::from(wallet)))
}

pub async fn transfer(
    State(state): State<AppState>,
    auth: Authenticated<TransferScope>,
    Json(data): Json<TransferCreate>,
) -> Result<Json<TransactionResponse>> {
    let transaction = state.transfers.transfer(auth.user_id, data.wallet_id, data.amount).await?;
    Ok(Json(TransactionResponse::for_user(transaction, auth.user_id)))
}

/// The caller's transactions, most recent first.
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
    auth: Authenticated<ReadScope>,
) -> Result<Json<Vec<TransactionResponse>>> {
    let transactions = state.transfers.history(auth.user_id, query.skip, query.limit).await?;
    Ok(Json(
        transactions
            .into_iter()
            .map(|t| TransactionResponse::for_user(t, auth.user_id))
            .collect(),
    ))
}
