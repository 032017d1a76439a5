//! Gateway-funded deposits.
//!
//! A deposit is a `transactions` row that starts `pending` and is settled at most once:
//!
//! ```text
//!            initiate                 charge.success / verify=success
//!   (none) ───────────▶ pending ─────────────────────────────────────▶ success
//!                          │
//!                          │ verify=failed|abandoned
//!                          ▼
//!                        failed
//! ```
//!
//! The pending row is committed before the gateway is called, so a crash or gateway timeout
//! always leaves a record that a later webhook or [`DepositReconciler::refresh`] can settle.
//! Notifications are delivered at least once and possibly concurrently; the store's settle
//! operation checks the status and credits the wallet in one atomic unit, so duplicates are
//! acknowledged without crediting twice.

use crate::crypto::generate_deposit_reference;
use crate::db::models::transactions::{PendingDepositCreateDBRequest, Transaction, TransactionKind, TransactionStatus};
use crate::db::store::{LedgerStore, SettleOutcome};
use crate::ledger::LedgerError;
use crate::payment_providers::{signing, GatewayPaymentStatus, InitializePayment, PaymentGateway};
use crate::types::{abbrev_uuid, from_minor_units, to_minor_units, validate_amount, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// The only notification event that credits a wallet.
pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

/// Returned to the payer so they can complete the payment on the gateway's page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositInitiated {
    pub reference: String,
    pub authorization_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositStatus {
    pub reference: String,
    pub status: TransactionStatus,
    pub amount: Decimal,
}

impl DepositStatus {
    fn from_transaction(reference: &str, transaction: &Transaction) -> Self {
        Self {
            reference: reference.to_string(),
            status: transaction.status,
            amount: transaction.amount,
        }
    }
}

/// What a verified notification did.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The deposit moved to success and the wallet now holds `balance`.
    Credited { reference: String, balance: Decimal },
    /// The deposit was already successful; nothing changed.
    AlreadyProcessed { reference: String },
    /// An event type that does not settle deposits.
    Ignored { event: String },
}

#[derive(Debug, Deserialize)]
struct Notification {
    event: String,
    #[serde(default)]
    data: NotificationData,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationData {
    reference: Option<String>,
    /// Minor units
    amount: Option<i64>,
}

pub struct DepositReconciler {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_secret: String,
    callback_url: String,
}

impl DepositReconciler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            webhook_secret: webhook_secret.into(),
            callback_url: callback_url.into(),
        }
    }

    /// Record a pending deposit and open a hosted payment page for it.
    ///
    /// If the gateway call fails the pending row stays in place and the error is returned as
    /// [`LedgerError::ExternalService`].
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn initiate(&self, user_id: UserId, amount: Decimal) -> Result<DepositInitiated, LedgerError> {
        let amount = validate_amount(amount)?;
        let amount_minor = to_minor_units(amount)?;
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::WalletNotFound(user_id.to_string()))?;

        let reference = generate_deposit_reference();
        self.store
            .insert_pending_deposit(&PendingDepositCreateDBRequest {
                receiver_id: user_id,
                amount,
                reference: reference.clone(),
            })
            .await?;

        let request = InitializePayment {
            amount_minor,
            email: user.email,
            reference: reference.clone(),
            callback_url: self.callback_url.clone(),
        };
        let authorization_url = self.gateway.initialize(&request).await.map_err(|e| {
            warn!(%reference, "Gateway initialize failed, deposit left pending: {e}");
            LedgerError::ExternalService(e)
        })?;

        info!(%reference, %amount, "Deposit initiated");
        Ok(DepositInitiated {
            reference,
            authorization_url,
        })
    }

    /// Handle a gateway notification.
    ///
    /// The signature is checked over the raw bytes before anything is parsed. Events other than
    /// `charge.success` are acknowledged as no-ops.
    #[instrument(skip_all, err)]
    pub async fn reconcile(&self, payload: &[u8], signature: Option<&str>) -> Result<ReconcileOutcome, LedgerError> {
        let verified = signature.is_some_and(|s| signing::verify_signature(payload, s, &self.webhook_secret));
        if !verified {
            warn!(has_signature = signature.is_some(), "Rejected notification with invalid signature");
            return Err(LedgerError::InvalidSignature);
        }

        let notification: Notification =
            serde_json::from_slice(payload).map_err(|e| LedgerError::MalformedNotification(e.to_string()))?;
        if notification.event != CHARGE_SUCCESS_EVENT {
            debug!(event = %notification.event, "Ignoring notification event");
            return Ok(ReconcileOutcome::Ignored {
                event: notification.event,
            });
        }

        let reference = notification
            .data
            .reference
            .ok_or_else(|| LedgerError::MalformedNotification("missing data.reference".to_string()))?;
        let notified = notification.data.amount.map(from_minor_units);
        self.settle(&reference, notified).await
    }

    async fn settle(&self, reference: &str, notified: Option<Decimal>) -> Result<ReconcileOutcome, LedgerError> {
        match self.store.settle_deposit(reference, notified).await? {
            SettleOutcome::Credited { transaction, balance } => {
                info!(
                    %reference,
                    receiver = %abbrev_uuid(&transaction.receiver_id),
                    amount = %transaction.amount,
                    "Deposit settled"
                );
                Ok(ReconcileOutcome::Credited {
                    reference: reference.to_string(),
                    balance,
                })
            }
            SettleOutcome::AlreadySettled(_) => {
                info!(%reference, "Duplicate settlement for deposit, nothing to do");
                Ok(ReconcileOutcome::AlreadyProcessed {
                    reference: reference.to_string(),
                })
            }
            SettleOutcome::AlreadyFailed(_) => {
                warn!(%reference, "Settlement received for a failed deposit");
                Err(LedgerError::DepositFailed(reference.to_string()))
            }
            SettleOutcome::AmountMismatch { transaction, notified } => {
                error!(%reference, expected = %transaction.amount, %notified, "Deposit amount mismatch");
                Err(LedgerError::AmountMismatch {
                    reference: reference.to_string(),
                    expected: transaction.amount,
                    notified,
                })
            }
            SettleOutcome::UnknownReference => {
                error!(%reference, "Signed notification for a reference with no deposit");
                Err(LedgerError::UnknownReference(reference.to_string()))
            }
        }
    }

    async fn owned_deposit(&self, reference: &str, user_id: UserId) -> Result<Transaction, LedgerError> {
        self.store
            .transaction_by_reference(reference)
            .await?
            .filter(|t| t.kind == TransactionKind::Deposit && t.receiver_id == user_id)
            .ok_or_else(|| LedgerError::DepositNotFound(reference.to_string()))
    }

    /// Current state of one of the user's deposits.
    pub async fn status(&self, reference: &str, user_id: UserId) -> Result<DepositStatus, LedgerError> {
        let deposit = self.owned_deposit(reference, user_id).await?;
        Ok(DepositStatus::from_transaction(reference, &deposit))
    }

    /// Ask the gateway about a pending deposit and apply what it reports.
    ///
    /// This is the recovery path when a webhook never arrives. Success settles through the same
    /// atomic path as a notification; failed or abandoned payments move the deposit to failed.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn refresh(&self, reference: &str, user_id: UserId) -> Result<DepositStatus, LedgerError> {
        let deposit = self.owned_deposit(reference, user_id).await?;
        if deposit.status.is_terminal() {
            return Ok(DepositStatus::from_transaction(reference, &deposit));
        }

        let verified = self.gateway.verify(reference).await?;
        match verified.status {
            GatewayPaymentStatus::Success => {
                self.settle(reference, verified.amount_minor.map(from_minor_units)).await?;
            }
            GatewayPaymentStatus::Failed | GatewayPaymentStatus::Abandoned => {
                if let Some(failed) = self.store.fail_deposit(reference).await? {
                    info!(%reference, status = %failed.status, "Deposit marked failed after gateway check");
                }
            }
            GatewayPaymentStatus::Other(status) => {
                debug!(%reference, %status, "Gateway reports deposit still in progress");
            }
        }

        self.status(reference, user_id).await
    }
}
