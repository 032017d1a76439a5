//! Payment gateway abstraction.
//!
//! [`PaymentGateway`] is the seam between the deposit reconciler and whichever hosted-payment
//! provider is configured. Adapters only talk HTTP to the provider; they never touch the ledger.
//! Amounts cross this boundary in minor units (kobo/cents) as the providers expect.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::PaymentConfig;

pub mod dummy;
pub mod paystack;
pub mod signing;

/// Create a payment gateway from configuration.
///
/// This is the single point where config is turned into an adapter. Adding a provider means
/// adding a match arm here.
pub fn create_provider(config: &PaymentConfig) -> Result<Arc<dyn PaymentGateway>> {
    Ok(match config {
        PaymentConfig::Paystack(paystack_config) => Arc::new(paystack::PaystackProvider::try_from(paystack_config)?),
        PaymentConfig::Dummy(dummy_config) => Arc::new(dummy::DummyProvider::from(dummy_config)),
    })
}

/// Result type for payment gateway operations
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors that can occur talking to a payment gateway
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider API error: {0}")]
    ProviderApi(String),

    #[error("Payment provider did not respond in time")]
    Timeout,

    #[error("Payment provider request failed: {0}")]
    Transport(String),

    #[error("Invalid payment provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PaymentError::Timeout
        } else if err.is_decode() {
            PaymentError::InvalidResponse(err.to_string())
        } else {
            PaymentError::Transport(err.to_string())
        }
    }
}

/// Parameters for opening a hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializePayment {
    pub amount_minor: i64,
    pub email: String,
    pub reference: String,
    pub callback_url: String,
}

/// Payment state as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    Success,
    Failed,
    Abandoned,
    /// Anything else (ongoing, queued, pending, ...). Not terminal from our side.
    Other(String),
}

impl GatewayPaymentStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "success" => GatewayPaymentStatus::Success,
            "failed" | "reversed" => GatewayPaymentStatus::Failed,
            "abandoned" => GatewayPaymentStatus::Abandoned,
            other => GatewayPaymentStatus::Other(other.to_string()),
        }
    }
}

/// Result of asking the provider about a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub reference: String,
    pub status: GatewayPaymentStatus,
    /// Amount the provider collected, when it reports one.
    pub amount_minor: Option<i64>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted payment page and return its URL.
    async fn initialize(&self, request: &InitializePayment) -> Result<String>;

    /// Ask the provider for the current state of a payment.
    async fn verify(&self, reference: &str) -> Result<VerifiedPayment>;
}
