//! Persistence for users, wallets, transactions and API keys.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ TransferEngine / Reconciler  │
//! │ KeyLifecycleManager          │
//! └──────────────┬───────────────┘
//!                │ Arc<dyn LedgerStore>, Arc<dyn CredentialStore>
//!        ┌───────┴────────┐
//!        ↓                ↓
//! ┌─────────────┐  ┌─────────────┐
//! │  postgres   │  │  in_memory  │
//! └──────┬──────┘  └─────────────┘
//!        ↓
//! ┌─────────────┐
//! │ handlers    │  (repositories over &mut PgConnection)
//! └─────────────┘
//! ```
//!
//! - [`store`]: the storage traits and their outcome enums
//! - [`postgres`]: production implementations backed by a [`sqlx::PgPool`]
//! - [`in_memory`]: mutex-guarded implementations for tests and local runs
//! - [`handlers`]: per-table repositories used by the PostgreSQL stores
//! - [`models`]: row structs
//! - [`errors`]: [`DbError`](errors::DbError) and its mapping from `sqlx::Error`

pub mod errors;
pub mod handlers;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod store;
