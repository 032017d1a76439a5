//! HTTP request handlers.
//!
//! Handlers are thin: they pick the credential extractor for the route, call into the ledger
//! or key manager held in [`AppState`](crate::AppState), and convert the result into a response.
//! Domain errors become HTTP statuses through [`crate::errors::Error`].
//!
//! - [`api_keys`]: create, rollover, revoke and list keys (session only)
//! - [`wallet`]: deposits, balance, transfers and history (session or scoped key)
//! - [`payments`]: the gateway webhook (authenticated by signature)

pub mod api_keys;
pub mod payments;
pub mod wallet;
