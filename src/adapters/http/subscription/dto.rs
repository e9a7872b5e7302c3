//! Request and response DTOs for the subscription API.
//!
//! Wire types are separate from domain types so the API surface can
//! evolve without touching the aggregate. Timestamps go over the wire
//! as Unix seconds.

use serde::{Deserialize, Serialize};

use crate::domain::subscription::{Invoice, PaymentMethodSnapshot, Subscription};

/// Standard error body for non-2xx responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// POST /api/subscription request body.
#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub provider_customer_id: String,
    pub price_reference: String,
    /// Trial end as Unix seconds, if the subscription starts with a trial.
    #[serde(default)]
    pub trial_end: Option<i64>,
}

/// POST /api/subscription/cancel request body.
#[derive(Debug, Deserialize)]
pub struct CancelSubscriptionRequest {
    /// Defaults to a scheduled cancellation at period end.
    #[serde(default = "default_at_period_end")]
    pub at_period_end: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_at_period_end() -> bool {
    true
}

/// Card summary as rendered to clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentMethodResponse {
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
}

impl From<PaymentMethodSnapshot> for PaymentMethodResponse {
    fn from(snapshot: PaymentMethodSnapshot) -> Self {
        Self {
            brand: snapshot.brand,
            last4: snapshot.last4,
            exp_month: snapshot.exp_month,
            exp_year: snapshot.exp_year,
        }
    }
}

/// Subscription as rendered to clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub status: String,
    pub provider_subscription_id: Option<String>,
    pub price_reference: String,
    pub current_period_start: i64,
    pub current_period_end: i64,
    pub trial_end: Option<i64>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub days_remaining: u32,
    pub payment_method: Option<PaymentMethodResponse>,
    pub created_at: i64,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        Self {
            id: subscription.id.to_string(),
            status: subscription.status.as_str().to_string(),
            provider_subscription_id: subscription.provider_subscription_id.clone(),
            price_reference: subscription.price_reference.clone(),
            current_period_start: subscription.current_period_start.as_unix_secs(),
            current_period_end: subscription.current_period_end.as_unix_secs(),
            trial_end: subscription.trial_end.map(|t| t.as_unix_secs()),
            cancel_at_period_end: subscription.cancel_at_period_end,
            canceled_at: subscription.canceled_at.map(|t| t.as_unix_secs()),
            cancellation_reason: subscription.cancellation_reason.clone(),
            days_remaining: subscription.days_remaining(),
            payment_method: subscription
                .payment_method_snapshot
                .clone()
                .map(PaymentMethodResponse::from),
            created_at: subscription.created_at.as_unix_secs(),
        }
    }
}

/// GET /api/subscription response body.
///
/// `subscription` is null when the account has never subscribed.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionDetailResponse {
    pub subscription: Option<SubscriptionResponse>,
}

/// Invoice as rendered to clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub id: String,
    pub provider_invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf_url: Option<String>,
    pub paid_at: Option<i64>,
    pub created_at: i64,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id.to_string(),
            provider_invoice_id: invoice.provider_invoice_id,
            amount_cents: invoice.amount_cents,
            currency: invoice.currency,
            status: invoice.status.as_str().to_string(),
            hosted_invoice_url: invoice.hosted_invoice_url,
            invoice_pdf_url: invoice.invoice_pdf_url,
            paid_at: invoice.paid_at.map(|t| t.as_unix_secs()),
            created_at: invoice.created_at.as_unix_secs(),
        }
    }
}

/// GET /api/subscription/invoices response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<InvoiceResponse>,
}
