//! Authentication for the wallet API.
//!
//! Two credentials are accepted:
//!
//! ## 1. Session tokens
//!
//! `Authorization: Bearer <jwt>`, HS256-signed by the login service with the shared
//! `auth.session_secret`. The `sub` claim is the user id and `exp` is enforced. A session can do
//! everything its user can, including key management.
//!
//! ## 2. API keys
//!
//! `x-api-key: sk_live_...`, issued through `/keys/create`. Each key carries a subset of
//! `deposit`, `transfer` and `read`; routes declare the one they need with a scope marker on
//! [`current_user::Authenticated`]. Keys are stored only as Argon2id hashes.
//!
//! # Modules
//!
//! - [`current_user`]: extractors for handlers
//! - [`password`]: Argon2id hashing and verification of key secrets
//! - [`session`]: JWT verification (and minting for tooling and tests)

pub mod current_user;
pub mod password;
pub mod session;
