//! Dummy payment gateway for development.
//!
//! No money moves: `initialize` sends the payer straight back to the callback URL and `verify`
//! always reports success. Settlement still goes through the normal reconciliation path, so a
//! deposit made against this gateway credits the wallet once the status is refreshed.
//!
//! It is only built when `payment.dummy` is configured explicitly, and startup warns about it.

use async_trait::async_trait;
use tracing::info;

use crate::{
    config::DummyConfig,
    payment_providers::{GatewayPaymentStatus, InitializePayment, PaymentGateway, Result, VerifiedPayment},
};

pub struct DummyProvider {
    checkout_base: Option<String>,
}

impl From<&DummyConfig> for DummyProvider {
    fn from(config: &DummyConfig) -> Self {
        Self {
            checkout_base: config.checkout_url.as_ref().map(|u| u.as_str().trim_end_matches('/').to_string()),
        }
    }
}

#[async_trait]
impl PaymentGateway for DummyProvider {
    async fn initialize(&self, request: &InitializePayment) -> Result<String> {
        info!(reference = %request.reference, amount_minor = request.amount_minor, "Dummy gateway opened checkout");

        let base = self.checkout_base.as_deref().unwrap_or(&request.callback_url);
        Ok(format!("{base}?reference={}", request.reference))
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedPayment> {
        Ok(VerifiedPayment {
            reference: reference.to_string(),
            status: GatewayPaymentStatus::Success,
            amount_minor: None,
        })
    }
}
