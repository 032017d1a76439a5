//! Wallet ledger: transfers between users and gateway-funded deposits.
//!
//! - [`transfers`]: the [`TransferEngine`], which moves money between wallets and answers
//!   balance and history queries
//! - [`deposits`]: the [`DepositReconciler`], which opens deposits with the payment gateway and
//!   settles them exactly once from webhook notifications or status polls
//!
//! Both work against an injected [`LedgerStore`](crate::db::store::LedgerStore). All balance
//! mutations happen inside a single store call, so no error path can leave a wallet debited
//! without the matching credit.

pub mod deposits;
pub mod transfers;

pub use deposits::{DepositInitiated, DepositReconciler, DepositStatus, ReconcileOutcome};
pub use transfers::TransferEngine;

use crate::db::errors::DbError;
use crate::payment_providers::PaymentError;
use crate::types::AmountError;
use rust_decimal::Decimal;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    InvalidAmount(#[from] AmountError),

    #[error("cannot transfer to your own wallet")]
    SelfTransfer,

    #[error("insufficient funds: balance {available}, requested {requested}")]
    InsufficientFunds { available: Decimal, requested: Decimal },

    #[error("wallet {0} not found")]
    WalletNotFound(String),

    #[error("invalid notification signature")]
    InvalidSignature,

    #[error("malformed notification: {0}")]
    MalformedNotification(String),

    /// A signed notification named a reference we never issued.
    #[error("no deposit with reference {0}")]
    UnknownReference(String),

    /// A deposit lookup by a user who does not own it, or for a reference that does not exist.
    #[error("deposit {0} not found")]
    DepositNotFound(String),

    #[error("deposit {reference} amount mismatch: expected {expected}, notified {notified}")]
    AmountMismatch {
        reference: String,
        expected: Decimal,
        notified: Decimal,
    },

    #[error("deposit {0} already failed")]
    DepositFailed(String),

    #[error(transparent)]
    ExternalService(#[from] PaymentError),

    #[error(transparent)]
    Store(#[from] DbError),
}
