//! Payment gateway port - Interface to the billing provider's API.
//!
//! The gateway is the command channel to the provider: creating,
//! canceling, and resuming subscriptions. State changes the provider
//! makes in response come back asynchronously as webhook events; the
//! return values here are only the provider's immediate view.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the billing provider's API.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider understood and refused the request (4xx). Final;
    /// retrying the same request will not help.
    #[error("Provider rejected request: {0}")]
    Rejected(String),

    /// Transport failure or provider-side error (5xx). Retryable.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Returns true if the same request may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

impl From<GatewayError> for crate::domain::subscription::SubscriptionError {
    fn from(err: GatewayError) -> Self {
        use crate::domain::subscription::SubscriptionError;
        match err {
            GatewayError::Rejected(msg) => SubscriptionError::RemoteRejected(msg),
            GatewayError::Unavailable(msg) => SubscriptionError::RemoteUnavailable(msg),
        }
    }
}

/// The provider's view of a subscription, returned from gateway calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySubscription {
    /// Provider subscription ID (sub_xxx).
    pub id: String,
    /// Provider customer ID (cus_xxx).
    pub customer: String,
    /// Provider status string, e.g. "incomplete", "trialing".
    pub status: String,
    /// Billing period start, Unix seconds.
    pub current_period_start: i64,
    /// Billing period end, Unix seconds.
    pub current_period_end: i64,
    /// Trial end, Unix seconds, if a trial applies.
    pub trial_end: Option<i64>,
    /// Whether cancellation is scheduled for period end.
    pub cancel_at_period_end: bool,
}

/// A saved card, as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMethodSummary {
    /// Provider payment method ID (pm_xxx).
    pub id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
}

/// Port for billing provider subscription commands.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a subscription for a customer against a price.
    async fn create_subscription(
        &self,
        customer_id: &str,
        price_reference: &str,
        trial_end: Option<i64>,
    ) -> Result<GatewaySubscription, GatewayError>;

    /// Cancel a subscription immediately.
    async fn cancel_subscription_now(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError>;

    /// Schedule cancellation for the end of the current period.
    async fn cancel_subscription_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError>;

    /// Clear a scheduled cancellation, resuming the subscription.
    async fn resume_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError>;

    /// List the customer's saved card payment methods.
    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethodSummary>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_gateway_is_object_safe() {
        fn _accepts_dyn(_gateway: &dyn PaymentGateway) {}
    }

    #[test]
    fn unavailable_is_retryable_rejected_is_not() {
        assert!(GatewayError::Unavailable("timeout".to_string()).is_retryable());
        assert!(!GatewayError::Rejected("no such customer".to_string()).is_retryable());
    }
}
