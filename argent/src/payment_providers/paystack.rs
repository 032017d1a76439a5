//! Paystack adapter.
//!
//! Uses two endpoints of the Paystack transactions API, both authenticated with the secret key
//! as a bearer token:
//!
//! - `POST /transaction/initialize` opens a hosted checkout and returns `authorization_url`
//! - `GET /transaction/verify/{reference}` reports the state of a payment
//!
//! Every request is bounded by the configured timeout. A timeout surfaces as
//! [`PaymentError::Timeout`]; the caller keeps its pending record and can reconcile later.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, instrument, warn};

use crate::{
    config::PaystackConfig,
    payment_providers::{GatewayPaymentStatus, InitializePayment, PaymentError, PaymentGateway, Result, VerifiedPayment},
};

pub struct PaystackProvider {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl TryFrom<&PaystackConfig> for PaystackProvider {
    type Error = PaymentError;

    fn try_from(config: &PaystackConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::Transport(format!("build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }
}

/// Every Paystack response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: i64,
    reference: &'a str,
    callback_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: Option<i64>,
}

impl PaystackProvider {
    async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let http_status = response.status();
        let body = response.text().await?;

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            if http_status.is_success() {
                PaymentError::InvalidResponse(e.to_string())
            } else {
                PaymentError::ProviderApi(format!("HTTP {http_status}"))
            }
        })?;

        if !http_status.is_success() || !envelope.status {
            warn!(%http_status, message = %envelope.message, "Paystack rejected request");
            return Err(PaymentError::ProviderApi(envelope.message));
        }
        envelope
            .data
            .ok_or_else(|| PaymentError::InvalidResponse("missing data".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PaystackProvider {
    #[instrument(skip(self, request), fields(reference = %request.reference, amount_minor = request.amount_minor), err)]
    async fn initialize(&self, request: &InitializePayment) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&InitializeBody {
                email: &request.email,
                amount: request.amount_minor,
                reference: &request.reference,
                callback_url: &request.callback_url,
            })
            .send()
            .await?;

        let data: InitializeData = Self::read_envelope(response).await?;
        debug!("Paystack checkout opened");
        Ok(data.authorization_url)
    }

    #[instrument(skip(self), err)]
    async fn verify(&self, reference: &str) -> Result<VerifiedPayment> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let data: VerifyData = Self::read_envelope(response).await?;
        Ok(VerifiedPayment {
            status: GatewayPaymentStatus::parse(&data.status),
            reference: data.reference,
            amount_minor: data.amount,
        })
    }
}
