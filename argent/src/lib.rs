//! # argent: custodial wallet backend
//!
//! `argent` keeps one wallet per user, funds wallets through a hosted payment gateway, moves
//! money between wallets, and issues scoped API keys so other services can act on a user's
//! behalf.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); persistence is PostgreSQL through
//! `sqlx`. Three services hold the domain rules and are shared through [`AppState`]:
//!
//! - [`ledger::TransferEngine`]: atomic wallet-to-wallet transfers, balances, history
//! - [`ledger::DepositReconciler`]: opens deposits with the gateway and settles each exactly
//!   once from signed webhooks or status polls
//! - [`keys::KeyLifecycleManager`]: issue, validate, revoke and roll over API keys under a
//!   per-user quota
//!
//! Each depends only on the capability traits in [`db::store`], implemented for PostgreSQL in
//! [`db::postgres`] and in process memory in [`db::in_memory`]. When no database URL is
//! configured the application runs on the in-memory stores, which is handy for local
//! development and is what the HTTP tests use.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use argent::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = argent::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     argent::telemetry::init_telemetry(&config.telemetry)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await?;
//!
//!     Ok(())
//! }
//! ```
pub mod api;
pub mod auth;
pub mod config;
mod crypto;
pub mod db;
pub mod errors;
pub mod keys;
pub mod ledger;
pub mod payment_providers;
pub mod telemetry;
mod types;

use crate::{
    api::handlers::{api_keys, payments, wallet},
    db::{
        in_memory::{InMemoryCredentialStore, InMemoryLedgerStore},
        postgres::{PgCredentialStore, PgLedgerStore},
        store::{CredentialStore, LedgerStore},
    },
    errors::Error,
    keys::KeyLifecycleManager,
    ledger::{DepositReconciler, TransferEngine},
    payment_providers::PaymentGateway,
};
use axum::{
    Router,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use config::{PaymentConfig, PoolSettings};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument, warn};

pub use types::{ApiKeyId, TransactionId, UserId, WalletId};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .transfers(Arc::new(TransferEngine::new(ledger.clone())))
///     .deposits(Arc::new(reconciler))
///     .keys(Arc::new(keys))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub transfers: Arc<TransferEngine>,
    /// `None` when no payment gateway is configured
    pub deposits: Option<Arc<DepositReconciler>>,
    pub keys: Arc<KeyLifecycleManager>,
}

impl AppState {
    /// Wire the domain services over the given stores and gateway.
    ///
    /// Deposits are only enabled when both a gateway and `config.payment` (which holds the webhook
    /// secret) are present.
    pub fn from_parts(
        config: Config,
        ledger: Arc<dyn LedgerStore>,
        credentials: Arc<dyn CredentialStore>,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let deposits = config.payment.as_ref().zip(gateway).map(|(payment, gateway)| {
            Arc::new(DepositReconciler::new(
                ledger.clone(),
                gateway,
                payment.webhook_secret(),
                config.callback_url(),
            ))
        });
        let keys = KeyLifecycleManager::new(credentials, config.api_keys.max_active_per_user, config.api_keys.argon2);

        AppState::builder()
            .transfers(Arc::new(TransferEngine::new(ledger)))
            .maybe_deposits(deposits)
            .keys(Arc::new(keys))
            .config(config)
            .build()
    }

    /// The deposit reconciler, or 503 when this deployment has no payment gateway.
    pub fn deposits(&self) -> errors::Result<&DepositReconciler> {
        self.deposits.as_deref().ok_or_else(|| Error::ServiceUnavailable {
            message: "Deposits are unavailable: no payment provider is configured".to_string(),
        })
    }
}

/// Get the argent database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Open the pool with the configured settings. Zero timeouts mean "never".
async fn connect_pool(url: &str, settings: &PoolSettings) -> anyhow::Result<PgPool> {
    let seconds = |s: u64| (s > 0).then(|| Duration::from_secs(s));
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(seconds(settings.idle_timeout_secs))
        .max_lifetime(seconds(settings.max_lifetime_secs))
        .connect(url)
        .await?;
    Ok(pool)
}

/// Build the application router with all endpoints and the tracing middleware.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> Router {
    let key_routes = Router::new()
        .route("/keys", get(api_keys::list_api_keys))
        .route("/keys/create", post(api_keys::create_api_key))
        .route("/keys/rollover", post(api_keys::rollover_api_key))
        .route("/keys/{id}/revoke", post(api_keys::revoke_api_key));

    let wallet_routes = Router::new()
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/balance", get(wallet::get_balance))
        .route("/wallet/transfer", post(wallet::transfer))
        .route("/wallet/transactions", get(wallet::list_transactions))
        .route("/wallet/deposit", post(wallet::create_deposit))
        .route("/wallet/deposit/callback", get(wallet::deposit_callback))
        .route("/wallet/deposit/{reference}/status", get(wallet::deposit_status))
        .route("/wallet/deposit/{reference}/refresh", post(wallet::refresh_deposit))
        .route("/wallet/paystack/webhook", post(payments::paystack_webhook));

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(key_routes)
        .merge(wallet_routes)
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            ),
        )
        .with_state(state)
}

/// Main application struct that owns the router and the database pool.
///
/// 1. **Create**: [`Application::new`] connects, runs migrations and wires the services
/// 2. **Serve**: [`Application::serve`] binds and handles requests until the shutdown future
///    resolves, then closes the pool and flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting argent with configuration: {:#?}", config);

        let (pool, ledger, credentials): (Option<PgPool>, Arc<dyn LedgerStore>, Arc<dyn CredentialStore>) =
            match config.database.url.as_deref() {
                Some(url) => {
                    info!("Using PostgreSQL database");
                    let pool = connect_pool(url, &config.database.pool).await?;
                    migrator().run(&pool).await?;
                    (
                        Some(pool.clone()),
                        Arc::new(PgLedgerStore::new(pool.clone())),
                        Arc::new(PgCredentialStore::new(pool)),
                    )
                }
                None => {
                    warn!("No database configured: using in-memory stores, all data is lost on shutdown");
                    (
                        None,
                        Arc::new(InMemoryLedgerStore::new()),
                        Arc::new(InMemoryCredentialStore::new()),
                    )
                }
            };

        let gateway = match &config.payment {
            Some(payment) => {
                if let PaymentConfig::Dummy(_) = payment {
                    warn!("Dummy payment gateway is active: refreshed deposits are credited without any payment. Never use it in production");
                }
                Some(payment_providers::create_provider(payment)?)
            }
            None => {
                warn!("No payment provider configured: deposit and webhook routes will answer 503");
                None
            }
        };
        let state = AppState::from_parts(config.clone(), ledger, credentials, gateway);

        Ok(Self {
            router: build_router(state),
            config,
            pool,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("argent listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
