//! Prime Billing - Subscription lifecycle reconciliation service
//!
//! Keeps locally stored subscription records consistent with the payment
//! provider through commands (create, cancel, reactivate) and verified
//! webhook events applied under optimistic concurrency.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
