//! In-process adapter implementations.
//!
//! Back the ports with plain mutex-guarded collections. Used by the
//! integration tests and for local development without Postgres. The
//! subscription store enforces the same version check and unique
//! account constraint as the Postgres adapter.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::foundation::{AccountId, DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::subscription::{Invoice, Subscription};
use crate::ports::{
    CasOutcome, Notification, NotificationEmitter, ProcessedEventRecord, ProcessedEventStore,
    SaveResult, SubscriptionStore,
};

/// Mutex-guarded subscription store with real version checks.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: Mutex<Vec<Subscription>>,
    invoices: Mutex<Vec<Invoice>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut subscriptions = self.subscriptions.lock().map_err(lock_poisoned)?;
        if subscriptions
            .iter()
            .any(|s| s.account_id == subscription.account_id)
        {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                "Account already has a subscription",
            ));
        }
        subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<CasOutcome, DomainError> {
        let mut subscriptions = self.subscriptions.lock().map_err(lock_poisoned)?;
        let stored = subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
            })?;

        if stored.version != subscription.version {
            return Ok(CasOutcome::VersionConflict);
        }
        *stored = subscription.clone();
        stored.version = subscription.version + 1;
        Ok(CasOutcome::Committed)
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let subscriptions = self.subscriptions.lock().map_err(lock_poisoned)?;
        Ok(subscriptions.iter().find(|s| &s.id == id).cloned())
    }

    async fn find_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<Subscription>, DomainError> {
        let subscriptions = self.subscriptions.lock().map_err(lock_poisoned)?;
        Ok(subscriptions
            .iter()
            .find(|s| &s.account_id == account_id)
            .cloned())
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let subscriptions = self.subscriptions.lock().map_err(lock_poisoned)?;
        Ok(subscriptions
            .iter()
            .find(|s| s.provider_subscription_id.as_deref() == Some(provider_subscription_id))
            .cloned())
    }

    async fn upsert_invoice(&self, invoice: &Invoice) -> Result<(), DomainError> {
        let mut invoices = self.invoices.lock().map_err(lock_poisoned)?;
        match invoices
            .iter_mut()
            .find(|i| i.provider_invoice_id == invoice.provider_invoice_id)
        {
            Some(existing) => *existing = invoice.clone(),
            None => invoices.push(invoice.clone()),
        }
        Ok(())
    }

    async fn list_invoices(&self, account_id: &AccountId) -> Result<Vec<Invoice>, DomainError> {
        let invoices = self.invoices.lock().map_err(lock_poisoned)?;
        let mut matching: Vec<Invoice> = invoices
            .iter()
            .filter(|i| &i.account_id == account_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

/// Event ledger backed by a map keyed on provider event ID.
#[derive(Default)]
pub struct InMemoryProcessedEventStore {
    records: Mutex<HashMap<String, ProcessedEventRecord>>,
}

impl InMemoryProcessedEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events recorded.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn save(&self, record: &ProcessedEventRecord) -> Result<SaveResult, DomainError> {
        let mut records = self.records.lock().map_err(lock_poisoned)?;
        if records.contains_key(&record.event_id) {
            return Ok(SaveResult::AlreadyExists);
        }
        records.insert(record.event_id.clone(), record.clone());
        Ok(SaveResult::Inserted)
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut records = self.records.lock().map_err(lock_poisoned)?;
        let before = records.len();
        records.retain(|_, r| !r.processed_at.is_before(&cutoff));
        Ok((before - records.len()) as u64)
    }
}

/// Emitter that records notifications instead of delivering them.
#[derive(Default)]
pub struct RecordingNotificationEmitter {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotificationEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications emitted so far.
    pub fn emitted(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationEmitter for RecordingNotificationEmitter {
    async fn emit(&self, notification: &Notification) -> Result<(), DomainError> {
        let mut notifications = self.notifications.lock().map_err(lock_poisoned)?;
        notifications.push(notification.clone());
        Ok(())
    }
}

fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> DomainError {
    DomainError::new(ErrorCode::InternalError, "Store lock poisoned")
}
