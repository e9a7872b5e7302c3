//! Invoice records mirrored from provider invoice events.
//!
//! Invoices are append-mostly: each provider invoice maps to one local
//! row, upserted as paid/failed events arrive.

use crate::domain::foundation::{AccountId, InvoiceId, SubscriptionId, Timestamp};
use serde::{Deserialize, Serialize};

/// Outcome of a provider invoice, as far as this service tracks it.
///
/// `Open` is carried for invoices the provider has issued but not yet
/// settled; webhook events only ever record `Paid` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Paid,
    Failed,
    Open,
}

impl InvoiceStatus {
    /// Database/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Failed => "failed",
            InvoiceStatus::Open => "open",
        }
    }
}

/// Local mirror of a provider invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier for this invoice record.
    pub id: InvoiceId,

    /// Provider-side invoice ID. Unique; upserts key on it.
    pub provider_invoice_id: String,

    /// Subscription this invoice bills.
    pub subscription_id: SubscriptionId,

    /// Account that owns the subscription.
    pub account_id: AccountId,

    /// Invoice total in cents.
    pub amount_cents: i64,

    /// Lowercase ISO currency code, e.g. "usd".
    pub currency: String,

    /// Settlement outcome as last reported by the provider.
    pub status: InvoiceStatus,

    /// Provider-hosted page for this invoice, if available.
    pub hosted_invoice_url: Option<String>,

    /// Provider-hosted PDF for this invoice, if available.
    pub invoice_pdf_url: Option<String>,

    /// When the invoice was paid (if paid).
    pub paid_at: Option<Timestamp>,

    /// When this record was created.
    pub created_at: Timestamp,
}

impl Invoice {
    /// Create a paid invoice record.
    pub fn paid(
        provider_invoice_id: String,
        subscription_id: SubscriptionId,
        account_id: AccountId,
        amount_cents: i64,
        currency: String,
        hosted_invoice_url: Option<String>,
        invoice_pdf_url: Option<String>,
        paid_at: Timestamp,
    ) -> Self {
        Self {
            id: InvoiceId::new(),
            provider_invoice_id,
            subscription_id,
            account_id,
            amount_cents,
            currency,
            status: InvoiceStatus::Paid,
            hosted_invoice_url,
            invoice_pdf_url,
            paid_at: Some(paid_at),
            created_at: Timestamp::now(),
        }
    }

    /// Create a failed invoice record.
    pub fn failed(
        provider_invoice_id: String,
        subscription_id: SubscriptionId,
        account_id: AccountId,
        amount_cents: i64,
        currency: String,
        hosted_invoice_url: Option<String>,
    ) -> Self {
        Self {
            id: InvoiceId::new(),
            provider_invoice_id,
            subscription_id,
            account_id,
            amount_cents,
            currency,
            status: InvoiceStatus::Failed,
            hosted_invoice_url,
            invoice_pdf_url: None,
            paid_at: None,
            created_at: Timestamp::now(),
        }
    }
}
