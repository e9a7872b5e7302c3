//! HTTP handlers for subscription endpoints.
//!
//! These handlers connect axum routes to application layer command
//! handlers. The webhook handler is the provider-facing entry point;
//! everything else serves the account's own billing UI.

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{info, warn};

use crate::application::handlers::subscription::{
    ApplyProviderEventHandler, CancelSubscriptionCommand, CancelSubscriptionHandler,
    CreateSubscriptionCommand, CreateSubscriptionHandler, EventOutcome,
    ReactivateSubscriptionCommand, ReactivateSubscriptionHandler,
};
use crate::adapters::http::middleware::RequireAccount;
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{SubscriptionError, WebhookVerifier};
use crate::ports::{NotificationEmitter, PaymentGateway, ProcessedEventStore, SubscriptionStore};

use super::dto::{
    CancelSubscriptionRequest, CreateSubscriptionRequest, ErrorResponse, InvoiceListResponse,
    InvoiceResponse, SubscriptionDetailResponse, SubscriptionResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// Cloned per request; dependencies are Arc-wrapped for cheap sharing.
#[derive(Clone)]
pub struct BillingAppState {
    pub subscription_store: Arc<dyn SubscriptionStore>,
    pub event_ledger: Arc<dyn ProcessedEventStore>,
    pub payment_gateway: Arc<dyn PaymentGateway>,
    pub notification_emitter: Arc<dyn NotificationEmitter>,
    pub webhook_verifier: Arc<WebhookVerifier>,
}

impl BillingAppState {
    /// Create handlers on demand from the shared state.
    pub fn create_subscription_handler(&self) -> CreateSubscriptionHandler {
        CreateSubscriptionHandler::new(
            self.subscription_store.clone(),
            self.payment_gateway.clone(),
        )
    }

    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.subscription_store.clone(),
            self.payment_gateway.clone(),
            self.notification_emitter.clone(),
        )
    }

    pub fn reactivate_subscription_handler(&self) -> ReactivateSubscriptionHandler {
        ReactivateSubscriptionHandler::new(
            self.subscription_store.clone(),
            self.payment_gateway.clone(),
            self.notification_emitter.clone(),
        )
    }

    pub fn apply_event_handler(&self) -> ApplyProviderEventHandler {
        ApplyProviderEventHandler::new(
            self.subscription_store.clone(),
            self.event_ledger.clone(),
            self.notification_emitter.clone(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/subscription - Get the account's subscription.
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    RequireAccount(account): RequireAccount,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let subscription = state
        .subscription_store
        .find_by_account(&account.account_id)
        .await
        .map_err(SubscriptionError::from)?;

    let response = SubscriptionDetailResponse {
        subscription: subscription.map(SubscriptionResponse::from),
    };

    Ok(Json(response))
}

/// GET /api/subscription/invoices - List the account's invoices, newest first.
pub async fn list_invoices(
    State(state): State<BillingAppState>,
    RequireAccount(account): RequireAccount,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let invoices = state
        .subscription_store
        .list_invoices(&account.account_id)
        .await
        .map_err(SubscriptionError::from)?;

    let response = InvoiceListResponse {
        invoices: invoices.into_iter().map(InvoiceResponse::from).collect(),
    };

    Ok(Json(response))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/subscription - Create a subscription for the account.
pub async fn create_subscription(
    State(state): State<BillingAppState>,
    RequireAccount(account): RequireAccount,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let handler = state.create_subscription_handler();
    let cmd = CreateSubscriptionCommand {
        account_id: account.account_id,
        provider_customer_id: request.provider_customer_id,
        price_reference: request.price_reference,
        trial_end: request.trial_end.map(Timestamp::from_unix_secs),
    };

    let subscription = handler.handle(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from(subscription)),
    ))
}

/// POST /api/subscription/cancel - Cancel the account's subscription.
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    RequireAccount(account): RequireAccount,
    Json(request): Json<CancelSubscriptionRequest>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let handler = state.cancel_subscription_handler();
    let cmd = CancelSubscriptionCommand {
        account_id: account.account_id,
        at_period_end: request.at_period_end,
        reason: request.reason,
    };

    let subscription = handler.handle(cmd).await?;

    Ok(Json(SubscriptionResponse::from(subscription)))
}

/// POST /api/subscription/reactivate - Undo a scheduled cancellation.
pub async fn reactivate_subscription(
    State(state): State<BillingAppState>,
    RequireAccount(account): RequireAccount,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let handler = state.reactivate_subscription_handler();
    let cmd = ReactivateSubscriptionCommand {
        account_id: account.account_id,
    };

    let subscription = handler.handle(cmd).await?;

    Ok(Json(SubscriptionResponse::from(subscription)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Handler
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/stripe - Handle provider webhook events.
///
/// Authenticated by signature, not by bearer token. The response status
/// drives the provider's redelivery: 2xx acknowledges, 5xx retries.
pub async fn handle_provider_webhook(
    State(state): State<BillingAppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> axum::response::Response {
    let Some(signature) = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "MISSING_SIGNATURE",
                "Missing Stripe-Signature header",
            )),
        )
            .into_response();
    };

    let event = match state.webhook_verifier.verify_and_parse(&body, signature) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Webhook verification failed");
            return (
                e.status_code(),
                Json(ErrorResponse::new("VERIFICATION_FAILED", e.to_string())),
            )
                .into_response();
        }
    };

    let event_id = event.id.clone();
    match state.apply_event_handler().handle(event).await {
        Ok(outcome) => {
            info!(event_id = %event_id, outcome = ?outcome, "Webhook event processed");
            let acknowledged = match outcome {
                EventOutcome::Applied => "applied",
                EventOutcome::Duplicate => "duplicate",
                EventOutcome::Ignored => "ignored",
            };
            (
                StatusCode::OK,
                Json(serde_json::json!({ "received": true, "outcome": acknowledged })),
            )
                .into_response()
        }
        Err(e) => {
            warn!(event_id = %event_id, error = %e, "Webhook event failed");
            (
                e.status_code(),
                Json(ErrorResponse::new("EVENT_FAILED", e.to_string())),
            )
                .into_response()
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts subscription errors to HTTP responses.
pub struct SubscriptionApiError(SubscriptionError);

impl From<SubscriptionError> for SubscriptionApiError {
    fn from(err: SubscriptionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for SubscriptionApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self.0 {
            SubscriptionError::NotFound => (StatusCode::NOT_FOUND, "SUBSCRIPTION_NOT_FOUND"),
            SubscriptionError::AlreadyActive => (StatusCode::CONFLICT, "SUBSCRIPTION_EXISTS"),
            SubscriptionError::TerminalState(_) => (StatusCode::CONFLICT, "TERMINAL_STATE"),
            SubscriptionError::Conflict => (StatusCode::CONFLICT, "CONCURRENT_UPDATE"),
            SubscriptionError::RemoteRejected(_) => {
                (StatusCode::PAYMENT_REQUIRED, "PROVIDER_REJECTED")
            }
            SubscriptionError::RemoteUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE")
            }
            SubscriptionError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            SubscriptionError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        (status, Json(ErrorResponse::new(code, self.0.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: SubscriptionError) -> StatusCode {
        SubscriptionApiError(err).into_response().status()
    }

    #[test]
    fn error_mapping_covers_all_variants() {
        assert_eq!(status_of(SubscriptionError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(SubscriptionError::AlreadyActive),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(SubscriptionError::TerminalState("canceled".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(SubscriptionError::Conflict), StatusCode::CONFLICT);
        assert_eq!(
            status_of(SubscriptionError::RemoteRejected("card declined".to_string())),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(SubscriptionError::RemoteUnavailable("timeout".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(SubscriptionError::Validation("empty".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(SubscriptionError::Storage("db down".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
