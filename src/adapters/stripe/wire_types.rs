//! Serde types for Stripe API responses.
//!
//! Only the fields this service reads are declared; everything else in
//! the provider's responses is ignored.

use serde::Deserialize;

/// Subscription object as returned by the provider API.
#[derive(Debug, Deserialize)]
pub struct WireSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_start: i64,
    pub current_period_end: i64,
    #[serde(default)]
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

/// Card details nested inside a payment method.
#[derive(Debug, Deserialize)]
pub struct WireCard {
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
}

/// Payment method object as returned by the provider API.
#[derive(Debug, Deserialize)]
pub struct WirePaymentMethod {
    pub id: String,
    #[serde(default)]
    pub card: Option<WireCard>,
}

/// Paginated list envelope.
#[derive(Debug, Deserialize)]
pub struct WireList<T> {
    pub data: Vec<T>,
}

/// Error envelope on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct WireError {
    pub error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct WireErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}
