//! ProcessedEventStore port - Interface for the idempotency ledger.
//!
//! Webhook events may be delivered more than once due to network
//! retries or provider redelivery. This port tracks which provider
//! events have been applied so a duplicate delivery is acknowledged
//! without being applied twice.
//!
//! ## Insert Is the Gate
//!
//! The record is inserted BEFORE the event is applied. The unique
//! constraint on the event ID is what serializes concurrent deliveries
//! of the same event: whichever delivery inserts first proceeds, the
//! loser sees `SaveResult::AlreadyExists` and stops.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};

/// Outcome of attempting to record an event in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// First delivery; the caller should apply the event.
    Inserted,
    /// A delivery of this event was already recorded; skip it.
    AlreadyExists,
}

/// Ledger entry for a processed provider event.
#[derive(Debug, Clone)]
pub struct ProcessedEventRecord {
    /// Provider event ID (evt_xxx). Unique.
    pub event_id: String,
    /// Provider event type string, kept for auditability.
    pub event_type: String,
    /// When this service recorded the event.
    pub processed_at: Timestamp,
    /// Raw event payload, kept for replay and debugging.
    pub payload: serde_json::Value,
}

/// Port for the webhook idempotency ledger.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Record an event, returning whether this is the first delivery.
    ///
    /// Must be atomic: two concurrent saves of the same event ID see
    /// one `Inserted` and one `AlreadyExists`.
    async fn save(&self, record: &ProcessedEventRecord) -> Result<SaveResult, DomainError>;

    /// Delete old ledger entries (cleanup/retention policy).
    ///
    /// Removes entries recorded before the specified timestamp.
    /// Returns the number of entries deleted.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory implementation for exercising the contract.
    struct InMemoryLedger {
        records: Mutex<HashMap<String, ProcessedEventRecord>>,
    }

    impl InMemoryLedger {
        fn new() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl ProcessedEventStore for InMemoryLedger {
        async fn save(&self, record: &ProcessedEventRecord) -> Result<SaveResult, DomainError> {
            let mut records = self.records.lock().await;
            if records.contains_key(&record.event_id) {
                return Ok(SaveResult::AlreadyExists);
            }
            records.insert(record.event_id.clone(), record.clone());
            Ok(SaveResult::Inserted)
        }

        async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
            let mut records = self.records.lock().await;
            let before = records.len();
            records.retain(|_, r| !r.processed_at.is_before(&cutoff));
            Ok((before - records.len()) as u64)
        }
    }

    fn record(event_id: &str) -> ProcessedEventRecord {
        ProcessedEventRecord {
            event_id: event_id.to_string(),
            event_type: "invoice.paid".to_string(),
            processed_at: Timestamp::now(),
            payload: serde_json::json!({"id": event_id}),
        }
    }

    #[tokio::test]
    async fn first_save_returns_inserted() {
        let ledger = InMemoryLedger::new();

        let result = ledger.save(&record("evt_1")).await.unwrap();

        assert_eq!(result, SaveResult::Inserted);
    }

    #[tokio::test]
    async fn duplicate_save_returns_already_exists() {
        let ledger = InMemoryLedger::new();

        ledger.save(&record("evt_2")).await.unwrap();
        let result = ledger.save(&record("evt_2")).await.unwrap();

        assert_eq!(result, SaveResult::AlreadyExists);
    }

    #[tokio::test]
    async fn different_events_insert_independently() {
        let ledger = InMemoryLedger::new();

        assert_eq!(
            ledger.save(&record("evt_a")).await.unwrap(),
            SaveResult::Inserted
        );
        assert_eq!(
            ledger.save(&record("evt_b")).await.unwrap(),
            SaveResult::Inserted
        );
    }

    #[tokio::test]
    async fn delete_before_removes_old_entries() {
        let ledger = InMemoryLedger::new();

        let mut old = record("evt_old");
        old.processed_at = Timestamp::now().add_days(-10);
        ledger.save(&old).await.unwrap();
        ledger.save(&record("evt_new")).await.unwrap();

        let deleted = ledger
            .delete_before(Timestamp::now().add_days(-1))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        // The recent entry still gates duplicates
        assert_eq!(
            ledger.save(&record("evt_new")).await.unwrap(),
            SaveResult::AlreadyExists
        );
    }
}
