//! Subscription HTTP adapter - billing REST API and webhook endpoint.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::BillingAppState;
pub use routes::{billing_router, subscription_routes, webhook_routes};
