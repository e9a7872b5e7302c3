//! HTTP adapters - REST API implementations.

pub mod middleware;
pub mod subscription;

// Re-export key types for convenience
pub use subscription::billing_router;
pub use subscription::BillingAppState;
