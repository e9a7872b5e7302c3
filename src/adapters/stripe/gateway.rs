//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` port against the Stripe REST API.
//!
//! # Error mapping
//!
//! - Transport failures, timeouts, 429 and 5xx responses map to
//!   `GatewayError::Unavailable` and are retried with backoff
//! - Other 4xx responses map to `GatewayError::Rejected` and are never
//!   retried; the provider has made a decision
//!
//! # Security
//!
//! The API key is held in `secrecy::SecretString` and only exposed at
//! the point of building the Authorization header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::ports::{GatewayError, GatewaySubscription, PaymentGateway, PaymentMethodSummary};

use super::wire_types::{WireError, WireList, WirePaymentMethod, WireSubscription};

/// Extra attempts after the first for retryable failures.
const GATEWAY_RETRIES: u32 = 2;

/// Initial backoff between attempts; doubles each retry.
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeGatewayConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for the Stripe API (default: https://api.stripe.com).
    api_base_url: String,
}

impl StripeGatewayConfig {
    /// Create a new gateway configuration.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: "https://api.stripe.com".to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Stripe implementation of the PaymentGateway port.
pub struct StripeGateway {
    config: StripeGatewayConfig,
    http_client: reqwest::Client,
}

impl StripeGateway {
    /// Create a new Stripe gateway with the given configuration.
    pub fn new(config: StripeGatewayConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Send a request, retrying transient failures with doubling backoff.
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: Option<&[(&str, String)]>,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let mut backoff = RETRY_BACKOFF;
        let mut last_error = None;

        for attempt in 0..=GATEWAY_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.attempt(method.clone(), &url, form).await {
                Ok(parsed) => return Ok(parsed),
                Err(e) if e.is_retryable() && attempt < GATEWAY_RETRIES => {
                    warn!(
                        path,
                        attempt = attempt + 1,
                        error = %e,
                        "Provider request failed, retrying"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| GatewayError::Unavailable("Retries exhausted".to_string())))
    }

    async fn attempt<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        form: Option<&[(&str, String)]>,
    ) -> Result<T, GatewayError> {
        let mut builder = self
            .http_client
            .request(method, url)
            .timeout(REQUEST_TIMEOUT)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None);

        if let Some(params) = form {
            builder = builder.form(params);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            debug!(url, status = status.as_u16(), "Provider request succeeded");
            return response
                .json()
                .await
                .map_err(|e| GatewayError::Unavailable(format!("Invalid response body: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_error_response(status, &body))
    }
}

/// Map a non-2xx provider response to a gateway error.
fn map_error_response(status: StatusCode, body: &str) -> GatewayError {
    let message = serde_json::from_str::<WireError>(body)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        GatewayError::Unavailable(message)
    } else {
        GatewayError::Rejected(message)
    }
}

fn to_gateway_subscription(wire: WireSubscription) -> GatewaySubscription {
    GatewaySubscription {
        id: wire.id,
        customer: wire.customer,
        status: wire.status,
        current_period_start: wire.current_period_start,
        current_period_end: wire.current_period_end,
        trial_end: wire.trial_end,
        cancel_at_period_end: wire.cancel_at_period_end,
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_subscription(
        &self,
        customer_id: &str,
        price_reference: &str,
        trial_end: Option<i64>,
    ) -> Result<GatewaySubscription, GatewayError> {
        let mut params = vec![
            ("customer", customer_id.to_string()),
            ("items[0][price]", price_reference.to_string()),
        ];
        if let Some(trial_end) = trial_end {
            params.push(("trial_end", trial_end.to_string()));
        }

        let wire: WireSubscription = self
            .request(Method::POST, "/v1/subscriptions", Some(&params))
            .await?;
        Ok(to_gateway_subscription(wire))
    }

    async fn cancel_subscription_now(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError> {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        let wire: WireSubscription = self.request(Method::DELETE, &path, None).await?;
        Ok(to_gateway_subscription(wire))
    }

    async fn cancel_subscription_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError> {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        let params = [("cancel_at_period_end", "true".to_string())];
        let wire: WireSubscription = self.request(Method::POST, &path, Some(&params)).await?;
        Ok(to_gateway_subscription(wire))
    }

    async fn resume_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError> {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        let params = [("cancel_at_period_end", "false".to_string())];
        let wire: WireSubscription = self.request(Method::POST, &path, Some(&params)).await?;
        Ok(to_gateway_subscription(wire))
    }

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethodSummary>, GatewayError> {
        let path = format!("/v1/payment_methods?customer={}&type=card", customer_id);
        let list: WireList<WirePaymentMethod> = self.request(Method::GET, &path, None).await?;

        Ok(list
            .data
            .into_iter()
            .filter_map(|pm| {
                pm.card.map(|card| PaymentMethodSummary {
                    id: pm.id,
                    brand: card.brand,
                    last4: card.last4,
                    exp_month: card.exp_month,
                    exp_year: card.exp_year,
                })
            })
            .collect())
    }
}
