//! Stripe adapter - HTTP client for the billing provider's API.

mod gateway;
mod wire_types;

pub use gateway::{StripeGateway, StripeGatewayConfig};
