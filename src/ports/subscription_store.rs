//! Subscription store port (write side).
//!
//! Defines the contract for persisting and retrieving Subscription
//! aggregates and their invoice records. Implementations handle the
//! actual database operations.
//!
//! # Design
//!
//! - **Versioned writes**: `update` is a compare-and-swap on the
//!   aggregate's `version` field. A conflicting concurrent write
//!   surfaces as `CasOutcome::VersionConflict` instead of silently
//!   winning.
//! - **Unique constraint**: Only one subscription per account.

use crate::domain::foundation::{AccountId, DomainError, SubscriptionId};
use crate::domain::subscription::{Invoice, Subscription};
use async_trait::async_trait;

/// Result of a compare-and-swap update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The row matched the expected version and the write committed.
    Committed,
    /// Another writer got there first; re-read and re-evaluate.
    VersionConflict,
}

/// Store port for Subscription aggregate persistence.
///
/// Implementations must ensure:
/// - Unique account_id constraint
/// - Version check on every update (optimistic concurrency)
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert a new subscription at version 0.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the account already has a subscription
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Update an existing subscription if its stored version still
    /// matches `subscription.version`. On success the stored row moves
    /// to `subscription.version + 1`.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the row doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, subscription: &Subscription) -> Result<CasOutcome, DomainError>;

    /// Find a subscription by its ID.
    ///
    /// Returns `None` if not found.
    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// Find a subscription by account ID.
    ///
    /// Returns `None` if the account has no subscription. This is the
    /// primary lookup since each account has at most one subscription.
    async fn find_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Find a subscription by its provider-side subscription ID.
    ///
    /// Webhook payloads identify subscriptions this way.
    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Insert or update an invoice record, keyed on provider_invoice_id.
    ///
    /// Redelivered invoice events overwrite the existing row rather
    /// than creating duplicates.
    async fn upsert_invoice(&self, invoice: &Invoice) -> Result<(), DomainError>;

    /// List invoices for an account, newest first.
    async fn list_invoices(&self, account_id: &AccountId) -> Result<Vec<Invoice>, DomainError>;
}
