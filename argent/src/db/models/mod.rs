//! Database record models matching table schemas.
//!
//! These structs correspond to rows of the `users`, `wallets`, `transactions` and `api_keys`
//! tables. Stores return them from queries and accept the `*CreateDBRequest` structs as insert
//! payloads. They are kept separate from the API models in [`crate::api::models`] so the wire
//! format and the storage layout can evolve independently.
//!
//! - [`users`]: account holders, one wallet each
//! - [`wallets`]: balances
//! - [`transactions`]: transfers and deposits, including pending deposits
//! - [`api_keys`]: hashed API key records and their permissions

pub mod api_keys;
pub mod transactions;
pub mod users;
pub mod wallets;
