//! PostgreSQL implementation of SubscriptionStore.
//!
//! Provides persistent storage for Subscription aggregates and their
//! invoice records. Updates are compare-and-swap on the `version`
//! column so concurrent writers cannot silently overwrite each other.

use crate::domain::foundation::{
    AccountId, DomainError, ErrorCode, InvoiceId, SubscriptionId, Timestamp,
};
use crate::domain::subscription::{
    Invoice, InvoiceStatus, PaymentMethodSnapshot, Subscription, SubscriptionStatus,
};
use crate::ports::{CasOutcome, SubscriptionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of the SubscriptionStore port.
///
/// Uses sqlx for type-safe database operations with connection pooling.
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    /// Creates a new PostgresSubscriptionStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    account_id: Uuid,
    provider_subscription_id: Option<String>,
    provider_customer_id: String,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    trial_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    canceled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    price_reference: String,
    payment_method_brand: Option<String>,
    payment_method_last4: Option<String>,
    payment_method_exp_month: Option<i16>,
    payment_method_exp_year: Option<i16>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = parse_status(&row.status)?;

        let payment_method_snapshot = match (
            row.payment_method_brand,
            row.payment_method_last4,
            row.payment_method_exp_month,
            row.payment_method_exp_year,
        ) {
            (Some(brand), Some(last4), Some(exp_month), Some(exp_year)) => {
                Some(PaymentMethodSnapshot {
                    brand,
                    last4,
                    exp_month: u8::try_from(exp_month).map_err(|_| {
                        DomainError::new(
                            ErrorCode::DatabaseError,
                            format!("Invalid exp_month value: {}", exp_month),
                        )
                    })?,
                    exp_year: u16::try_from(exp_year).map_err(|_| {
                        DomainError::new(
                            ErrorCode::DatabaseError,
                            format!("Invalid exp_year value: {}", exp_year),
                        )
                    })?,
                })
            }
            _ => None,
        };

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            account_id: AccountId::from_uuid(row.account_id),
            provider_subscription_id: row.provider_subscription_id,
            provider_customer_id: row.provider_customer_id,
            status,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            trial_end: row.trial_end.map(Timestamp::from_datetime),
            cancel_at_period_end: row.cancel_at_period_end,
            canceled_at: row.canceled_at.map(Timestamp::from_datetime),
            cancellation_reason: row.cancellation_reason,
            price_reference: row.price_reference,
            payment_method_snapshot,
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

/// Database row representation of an invoice.
#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    provider_invoice_id: String,
    subscription_id: Uuid,
    account_id: Uuid,
    amount_cents: i64,
    currency: String,
    status: String,
    hosted_invoice_url: Option<String>,
    invoice_pdf_url: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DomainError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: InvoiceId::from_uuid(row.id),
            provider_invoice_id: row.provider_invoice_id,
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            account_id: AccountId::from_uuid(row.account_id),
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: parse_invoice_status(&row.status)?,
            hosted_invoice_url: row.hosted_invoice_url,
            invoice_pdf_url: row.invoice_pdf_url,
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

fn parse_status(s: &str) -> Result<SubscriptionStatus, DomainError> {
    match s {
        "incomplete" => Ok(SubscriptionStatus::Incomplete),
        "trialing" => Ok(SubscriptionStatus::Trialing),
        "active" => Ok(SubscriptionStatus::Active),
        "past_due" => Ok(SubscriptionStatus::PastDue),
        "canceled" => Ok(SubscriptionStatus::Canceled),
        "unpaid" => Ok(SubscriptionStatus::Unpaid),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid status value: {}", s),
        )),
    }
}

fn parse_invoice_status(s: &str) -> Result<InvoiceStatus, DomainError> {
    match s {
        "paid" => Ok(InvoiceStatus::Paid),
        "failed" => Ok(InvoiceStatus::Failed),
        "open" => Ok(InvoiceStatus::Open),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid invoice status value: {}", s),
        )),
    }
}

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, account_id, provider_subscription_id, provider_customer_id, status,
    current_period_start, current_period_end, trial_end, cancel_at_period_end,
    canceled_at, cancellation_reason, price_reference,
    payment_method_brand, payment_method_last4,
    payment_method_exp_month, payment_method_exp_year,
    version, created_at, updated_at
"#;

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let snapshot = subscription.payment_method_snapshot.as_ref();

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, account_id, provider_subscription_id, provider_customer_id, status,
                current_period_start, current_period_end, trial_end, cancel_at_period_end,
                canceled_at, cancellation_reason, price_reference,
                payment_method_brand, payment_method_last4,
                payment_method_exp_month, payment_method_exp_year,
                version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.account_id.as_uuid())
        .bind(&subscription.provider_subscription_id)
        .bind(&subscription.provider_customer_id)
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(subscription.trial_end.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.canceled_at.as_ref().map(Timestamp::as_datetime))
        .bind(&subscription.cancellation_reason)
        .bind(&subscription.price_reference)
        .bind(snapshot.map(|s| s.brand.clone()))
        .bind(snapshot.map(|s| s.last4.clone()))
        .bind(snapshot.map(|s| i16::from(s.exp_month)))
        .bind(snapshot.map(|s| s.exp_year as i16))
        .bind(subscription.version)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("subscriptions_account_id_key") {
                    return DomainError::new(
                        ErrorCode::ValidationFailed,
                        "Account already has a subscription",
                    );
                }
            }
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to insert subscription: {}", e),
            )
        })?;

        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<CasOutcome, DomainError> {
        let snapshot = subscription.payment_method_snapshot.as_ref();

        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                provider_subscription_id = $2,
                status = $3,
                current_period_start = $4,
                current_period_end = $5,
                trial_end = $6,
                cancel_at_period_end = $7,
                canceled_at = $8,
                cancellation_reason = $9,
                payment_method_brand = $10,
                payment_method_last4 = $11,
                payment_method_exp_month = $12,
                payment_method_exp_year = $13,
                updated_at = $14,
                version = version + 1
            WHERE id = $1 AND version = $15
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(&subscription.provider_subscription_id)
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(subscription.trial_end.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.canceled_at.as_ref().map(Timestamp::as_datetime))
        .bind(&subscription.cancellation_reason)
        .bind(snapshot.map(|s| s.brand.clone()))
        .bind(snapshot.map(|s| s.last4.clone()))
        .bind(snapshot.map(|s| i16::from(s.exp_month)))
        .bind(snapshot.map(|s| s.exp_year as i16))
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.version)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to update subscription: {}", e),
            )
        })?;

        if result.rows_affected() > 0 {
            return Ok(CasOutcome::Committed);
        }

        // Zero rows is either a stale version or a missing row
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM subscriptions WHERE id = $1")
            .bind(subscription.id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Failed to check subscription: {}", e),
                )
            })?;

        if exists.is_some() {
            Ok(CasOutcome::VersionConflict)
        } else {
            Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                "Subscription not found",
            ))
        }
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to find subscription: {}", e),
            )
        })?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE account_id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(account_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to find subscription: {}", e),
            )
        })?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE provider_subscription_id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(provider_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to find subscription: {}", e),
            )
        })?;

        row.map(Subscription::try_from).transpose()
    }

    async fn upsert_invoice(&self, invoice: &Invoice) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscription_invoices (
                id, provider_invoice_id, subscription_id, account_id, amount_cents,
                currency, status, hosted_invoice_url, invoice_pdf_url, paid_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (provider_invoice_id) DO UPDATE SET
                amount_cents = EXCLUDED.amount_cents,
                status = EXCLUDED.status,
                hosted_invoice_url = EXCLUDED.hosted_invoice_url,
                invoice_pdf_url = EXCLUDED.invoice_pdf_url,
                paid_at = EXCLUDED.paid_at
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(&invoice.provider_invoice_id)
        .bind(invoice.subscription_id.as_uuid())
        .bind(invoice.account_id.as_uuid())
        .bind(invoice.amount_cents)
        .bind(&invoice.currency)
        .bind(invoice.status.as_str())
        .bind(&invoice.hosted_invoice_url)
        .bind(&invoice.invoice_pdf_url)
        .bind(invoice.paid_at.as_ref().map(Timestamp::as_datetime))
        .bind(invoice.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to upsert invoice: {}", e),
            )
        })?;

        Ok(())
    }

    async fn list_invoices(&self, account_id: &AccountId) -> Result<Vec<Invoice>, DomainError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(
            r#"
            SELECT id, provider_invoice_id, subscription_id, account_id, amount_cents,
                   currency, status, hosted_invoice_url, invoice_pdf_url, paid_at, created_at
            FROM subscription_invoices
            WHERE account_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to list invoices: {}", e),
            )
        })?;

        rows.into_iter().map(Invoice::try_from).collect()
    }
}
