//! Axum router configuration for subscription endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, create_subscription, get_subscription, handle_provider_webhook,
    list_invoices, reactivate_subscription, BillingAppState,
};

/// Create the subscription API router.
///
/// # Routes
///
/// ## Account Endpoints (require authentication)
/// - `GET /` - Get the account's subscription
/// - `GET /invoices` - List the account's invoices
/// - `POST /` - Create a subscription
/// - `POST /cancel` - Cancel (scheduled or immediate)
/// - `POST /reactivate` - Undo a scheduled cancellation
pub fn subscription_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/", get(get_subscription).post(create_subscription))
        .route("/invoices", get(list_invoices))
        .route("/cancel", post(cancel_subscription))
        .route("/reactivate", post(reactivate_subscription))
}

/// Create the webhook router.
///
/// Separate from the account routes because webhooks don't carry a
/// bearer token; they are authenticated by signature.
///
/// # Routes
/// - `POST /stripe` - Handle provider webhooks
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_provider_webhook))
}

/// Create the complete billing module router.
///
/// Suitable for mounting at `/api`:
///
/// ```ignore
/// let app = Router::new()
///     .nest("/api", billing_router())
///     .with_state(app_state);
/// ```
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/subscription", subscription_routes())
        .nest("/webhooks", webhook_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapters::memory::{
        InMemoryProcessedEventStore, InMemorySubscriptionStore, RecordingNotificationEmitter,
    };
    use crate::application::handlers::subscription::test_support::MockPaymentGateway;
    use crate::domain::subscription::WebhookVerifier;

    fn test_state() -> BillingAppState {
        BillingAppState {
            subscription_store: Arc::new(InMemorySubscriptionStore::new()),
            event_ledger: Arc::new(InMemoryProcessedEventStore::new()),
            payment_gateway: Arc::new(MockPaymentGateway::new()),
            notification_emitter: Arc::new(RecordingNotificationEmitter::new()),
            webhook_verifier: Arc::new(WebhookVerifier::new("whsec_test_secret")),
        }
    }

    #[test]
    fn subscription_routes_creates_router() {
        let router = subscription_routes();
        let _: Router<()> = router.with_state(test_state());
    }

    #[test]
    fn webhook_routes_creates_router() {
        let router = webhook_routes();
        let _: Router<()> = router.with_state(test_state());
    }

    #[test]
    fn billing_router_creates_combined_router() {
        let router = billing_router();
        let _: Router<()> = router.with_state(test_state());
    }
}
