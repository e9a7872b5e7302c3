//! Subscription domain module.
//!
//! Handles the subscription lifecycle: the aggregate, the status state
//! machine, invoice records, provider event envelopes, and webhook
//! signature verification.

mod aggregate;
mod errors;
mod invoice;
mod provider_event;
mod status;
mod webhook_errors;
mod webhook_verifier;

pub use aggregate::{PaymentMethodSnapshot, Subscription};
pub use errors::SubscriptionError;
pub use invoice::{Invoice, InvoiceStatus};
pub use provider_event::{ProviderEvent, ProviderEventData, ProviderEventType};
pub use status::SubscriptionStatus;
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{SignatureHeader, WebhookVerifier};

#[cfg(test)]
pub use provider_event::ProviderEventBuilder;
#[cfg(test)]
pub use webhook_verifier::compute_test_signature;
