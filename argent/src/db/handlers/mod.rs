//! Repositories over a single PostgreSQL connection.
//!
//! Each repository borrows a `&mut PgConnection`, which may be a pooled connection or an open
//! transaction. They hold no state of their own; the stores in [`crate::db::postgres`] decide
//! the transaction boundaries and compose several repositories inside one transaction.
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let wallets = Wallets::new(&mut tx).lock_for_update(&[from, to]).await?;
//! // ... debit, credit, record ...
//! tx.commit().await?;
//! ```

pub mod api_keys;
pub mod transactions;
pub mod users;
pub mod wallets;

pub use api_keys::ApiKeys;
pub use transactions::Transactions;
pub use users::Users;
pub use wallets::Wallets;
