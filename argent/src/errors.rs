use crate::db::errors::DbError;
use crate::db::models::api_keys::KeyPermission;
use crate::keys::KeyError;
use crate::ledger::LedgerError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// A credential was presented but is unknown, expired, revoked or badly signed
    #[error("Invalid credential: {message}")]
    InvalidCredential { message: String },

    /// The API key is valid but does not carry the permission the route needs
    #[error("API key lacks the '{required}' permission")]
    InsufficientPermission { required: KeyPermission },

    /// Authenticated, but acting on something the caller does not own
    #[error("{message}")]
    Unauthorized { message: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    #[error("Insufficient funds: balance {available}, requested {requested}")]
    InsufficientFunds { available: Decimal, requested: Decimal },

    /// Requested resource not found
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    /// The active-key quota is full
    #[error("{message}")]
    QuotaExceeded { message: String },

    /// State conflict, e.g. rolling over a key that has not expired
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// The payment gateway failed or timed out. The message is for logs only.
    #[error("External service error: {message}")]
    ExternalService { message: String },

    /// A feature whose backing service is not configured on this deployment
    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } | Error::InvalidCredential { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermission { .. } | Error::Unauthorized { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::QuotaExceeded { .. } => StatusCode::PRECONDITION_FAILED,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            Error::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InvalidCredential { message } => message.clone(),
            Error::InsufficientPermission { required } => format!("API key lacks the '{required}' permission"),
            Error::Unauthorized { message } | Error::BadRequest { message } | Error::QuotaExceeded { message } => message.clone(),
            Error::InsufficientFunds { available, requested } => {
                format!("Insufficient funds: balance {available}, requested {requested}")
            }
            Error::NotFound { resource, id } => format!("{resource} {id} not found"),
            Error::Conflict { message } | Error::ServiceUnavailable { message } => message.clone(),
            Error::ExternalService { .. } => "Payment provider unavailable, please retry".to_string(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { table, constraint, .. } => match (table.as_deref(), constraint.as_deref()) {
                    (Some("users"), Some(c)) if c.contains("email") => "An account with this email address already exists".to_string(),
                    (Some("transactions"), Some("transactions_reference_key")) => "Duplicate transaction reference".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::ExternalService { .. } => {
                tracing::error!("Upstream failure: {}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. }
            | Error::InvalidCredential { .. }
            | Error::InsufficientPermission { .. }
            | Error::Unauthorized { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } | Error::InsufficientFunds { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Conflict { .. } | Error::QuotaExceeded { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            Error::ServiceUnavailable { .. } => {
                tracing::warn!("Unavailable: {}", self);
            }
        }

        let status = self.status_code();
        (status, Json(json!({ "error": self.user_message() }))).into_response()
    }
}

impl From<LedgerError> for Error {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount(e) => Error::BadRequest { message: e.to_string() },
            LedgerError::SelfTransfer | LedgerError::MalformedNotification(_) => Error::BadRequest { message: err.to_string() },
            LedgerError::InsufficientFunds { available, requested } => Error::InsufficientFunds { available, requested },
            LedgerError::WalletNotFound(id) => Error::NotFound {
                resource: "Wallet".to_string(),
                id,
            },
            LedgerError::DepositNotFound(reference) => Error::NotFound {
                resource: "Deposit".to_string(),
                id: reference,
            },
            LedgerError::UnknownReference(reference) => Error::NotFound {
                resource: "Transaction".to_string(),
                id: reference,
            },
            LedgerError::InvalidSignature => Error::InvalidCredential {
                message: "Invalid webhook signature".to_string(),
            },
            LedgerError::AmountMismatch { .. } | LedgerError::DepositFailed(_) => Error::Conflict { message: err.to_string() },
            LedgerError::ExternalService(e) => Error::ExternalService { message: e.to_string() },
            LedgerError::Store(e) => Error::Database(e),
        }
    }
}

impl From<KeyError> for Error {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::QuotaExceeded { limit } => Error::QuotaExceeded {
                message: format!("Maximum of {limit} active API keys reached; revoke a key first"),
            },
            KeyError::InvalidPermission(_) | KeyError::NoPermissions | KeyError::InvalidExpiry(_) | KeyError::InvalidName => {
                Error::BadRequest { message: err.to_string() }
            }
            KeyError::InvalidKey => Error::InvalidCredential {
                message: "Invalid, expired or revoked API key".to_string(),
            },
            KeyError::InsufficientPermission { required } => Error::InsufficientPermission { required },
            KeyError::KeyNotFound(id) => Error::NotFound {
                resource: "API key".to_string(),
                id: id.to_string(),
            },
            KeyError::Unauthorized => Error::Unauthorized {
                message: "API key belongs to another user".to_string(),
            },
            KeyError::NotExpired { .. } | KeyError::AlreadyRevoked => Error::Conflict { message: err.to_string() },
            KeyError::Hashing(e) => Error::Internal {
                operation: format!("process API key secret ({e})"),
            },
            KeyError::Blocking { operation, source } => Error::Internal {
                operation: format!("run {operation} ({source})"),
            },
            KeyError::Store(e) => Error::Database(e),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment_providers::PaymentError;
    use crate::types::AmountError;
    use axum::body::to_bytes;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_ledger_errors_map_to_statuses() {
        let cases = [
            (LedgerError::InvalidAmount(AmountError::NotPositive), StatusCode::BAD_REQUEST),
            (LedgerError::SelfTransfer, StatusCode::BAD_REQUEST),
            (
                LedgerError::InsufficientFunds {
                    available: dec!(1),
                    requested: dec!(2),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (LedgerError::WalletNotFound("w".into()), StatusCode::NOT_FOUND),
            (LedgerError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (LedgerError::DepositFailed("dep_x".into()), StatusCode::CONFLICT),
            (LedgerError::ExternalService(PaymentError::Timeout), StatusCode::BAD_GATEWAY),
            (LedgerError::Store(DbError::Other(anyhow::anyhow!("boom"))), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(Error::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_key_errors_map_to_statuses() {
        assert_eq!(
            Error::from(KeyError::QuotaExceeded { limit: 5 }).status_code(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(Error::from(KeyError::InvalidKey).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::from(KeyError::InsufficientPermission {
                required: KeyPermission::Transfer
            })
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(Error::from(KeyError::KeyNotFound(Uuid::nil())).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::from(KeyError::AlreadyRevoked).status_code(), StatusCode::CONFLICT);
        assert_eq!(Error::from(KeyError::NoPermissions).status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unconfigured_service_answers_503() {
        let err = Error::ServiceUnavailable {
            message: "Deposits are unavailable".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "error": "Deposits are unavailable" }));
    }

    #[tokio::test]
    async fn test_internal_details_are_not_leaked() {
        let err = Error::from(LedgerError::ExternalService(PaymentError::ProviderApi("secret upstream detail".into())));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "error": "Payment provider unavailable, please retry" }));

        let err = Error::Database(DbError::Other(anyhow::anyhow!("connection reset by peer")));
        assert_eq!(err.user_message(), "Database error occurred");
    }
}
