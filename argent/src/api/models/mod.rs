//! API request and response data models.
//!
//! API models are distinct from the database models so the stored shape (hashes, internal
//! flags) never leaks into responses by accident.
//!
//! - [`wallet`]: balances, deposits, transfers and transaction history
//! - [`api_keys`]: key creation and rollover payloads, key metadata (secrets are returned only
//!   once, on issue)

pub mod api_keys;
pub mod wallet;
