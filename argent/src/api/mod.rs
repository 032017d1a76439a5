//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - **Keys** (`/keys/*`): API key management for the signed-in user
//! - **Wallet** (`/wallet/*`): deposits, balance, transfers and transaction history
//! - **Webhook** (`/wallet/paystack/webhook`): payment gateway notifications
//!
//! Errors are returned as `{"error": "<message>"}` with the status from
//! [`Error::status_code`](crate::errors::Error::status_code).

pub mod handlers;
pub mod models;
