//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `postgres` - sqlx-backed stores (subscriptions, event ledger, notifications)
//! - `stripe` - HTTP payment gateway client
//! - `memory` - in-process stores for tests and local development
//! - `http` - axum routes and middleware

pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;
