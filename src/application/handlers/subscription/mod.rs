//! Subscription command and event handlers.
//!
//! Command handlers (create, cancel, reactivate) call the payment
//! gateway first and only then write locally, so the local mirror never
//! claims a state the provider refused. The event handler applies
//! verified webhook events to the mirror.
//!
//! All writes go through the store's compare-and-swap update. On a
//! version conflict the handler re-reads the row, re-checks its guard,
//! and retries up to [`MAX_CAS_ATTEMPTS`] times before giving up with
//! a conflict error.

mod apply_provider_event;
mod cancel_subscription;
mod create_subscription;
mod reactivate_subscription;

pub use apply_provider_event::{ApplyProviderEventHandler, EventOutcome};
pub use cancel_subscription::{CancelSubscriptionCommand, CancelSubscriptionHandler};
pub use create_subscription::{CreateSubscriptionCommand, CreateSubscriptionHandler};
pub use reactivate_subscription::{ReactivateSubscriptionCommand, ReactivateSubscriptionHandler};

/// How many times a handler attempts a compare-and-swap write before
/// surfacing a conflict to the caller.
pub(crate) const MAX_CAS_ATTEMPTS: u32 = 3;

#[cfg(test)]
pub(crate) mod test_support {
    //! Hand-rolled mocks shared by the handler test modules.

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::domain::foundation::{
        AccountId, DomainError, ErrorCode, SubscriptionId, Timestamp,
    };
    use crate::domain::subscription::{Invoice, Subscription};
    use crate::ports::{
        CasOutcome, GatewayError, GatewaySubscription, Notification, NotificationEmitter,
        PaymentGateway, PaymentMethodSummary, ProcessedEventRecord, ProcessedEventStore,
        SaveResult, SubscriptionStore,
    };

    // ════════════════════════════════════════════════════════════════════════════
    // Subscription Store Mock
    // ════════════════════════════════════════════════════════════════════════════

    pub struct MockSubscriptionStore {
        pub subscriptions: Mutex<Vec<Subscription>>,
        pub invoices: Mutex<Vec<Invoice>>,
        fail_update: bool,
        /// Number of upcoming updates that report a version conflict
        /// before writes start committing again.
        conflicts_remaining: Mutex<u32>,
    }

    impl MockSubscriptionStore {
        pub fn new() -> Self {
            Self {
                subscriptions: Mutex::new(Vec::new()),
                invoices: Mutex::new(Vec::new()),
                fail_update: false,
                conflicts_remaining: Mutex::new(0),
            }
        }

        pub fn with_subscription(subscription: Subscription) -> Self {
            let store = Self::new();
            store.subscriptions.lock().unwrap().push(subscription);
            store
        }

        pub fn failing_update() -> Self {
            Self {
                subscriptions: Mutex::new(Vec::new()),
                invoices: Mutex::new(Vec::new()),
                fail_update: true,
                conflicts_remaining: Mutex::new(0),
            }
        }

        pub fn conflict_next_updates(&self, count: u32) {
            *self.conflicts_remaining.lock().unwrap() = count;
        }

        pub fn stored(&self) -> Vec<Subscription> {
            self.subscriptions.lock().unwrap().clone()
        }

        pub fn stored_invoices(&self) -> Vec<Invoice> {
            self.invoices.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SubscriptionStore for MockSubscriptionStore {
        async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
            let mut subs = self.subscriptions.lock().unwrap();
            if subs.iter().any(|s| s.account_id == subscription.account_id) {
                return Err(DomainError::validation(
                    "account_id",
                    "Account already has a subscription",
                ));
            }
            subs.push(subscription.clone());
            Ok(())
        }

        async fn update(&self, subscription: &Subscription) -> Result<CasOutcome, DomainError> {
            if self.fail_update {
                return Err(DomainError::new(
                    ErrorCode::DatabaseError,
                    "Simulated update failure",
                ));
            }
            {
                let mut conflicts = self.conflicts_remaining.lock().unwrap();
                if *conflicts > 0 {
                    *conflicts -= 1;
                    return Ok(CasOutcome::VersionConflict);
                }
            }
            let mut subs = self.subscriptions.lock().unwrap();
            match subs.iter_mut().find(|s| s.id == subscription.id) {
                Some(existing) => {
                    if existing.version != subscription.version {
                        return Ok(CasOutcome::VersionConflict);
                    }
                    let mut updated = subscription.clone();
                    updated.version += 1;
                    *existing = updated;
                    Ok(CasOutcome::Committed)
                }
                None => Err(DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    "Subscription not found",
                )),
            }
        }

        async fn find_by_id(
            &self,
            id: &SubscriptionId,
        ) -> Result<Option<Subscription>, DomainError> {
            let subs = self.subscriptions.lock().unwrap();
            Ok(subs.iter().find(|s| &s.id == id).cloned())
        }

        async fn find_by_account(
            &self,
            account_id: &AccountId,
        ) -> Result<Option<Subscription>, DomainError> {
            let subs = self.subscriptions.lock().unwrap();
            Ok(subs.iter().find(|s| &s.account_id == account_id).cloned())
        }

        async fn find_by_provider_subscription_id(
            &self,
            provider_subscription_id: &str,
        ) -> Result<Option<Subscription>, DomainError> {
            let subs = self.subscriptions.lock().unwrap();
            Ok(subs
                .iter()
                .find(|s| {
                    s.provider_subscription_id.as_deref() == Some(provider_subscription_id)
                })
                .cloned())
        }

        async fn upsert_invoice(&self, invoice: &Invoice) -> Result<(), DomainError> {
            let mut invoices = self.invoices.lock().unwrap();
            match invoices
                .iter_mut()
                .find(|i| i.provider_invoice_id == invoice.provider_invoice_id)
            {
                Some(existing) => *existing = invoice.clone(),
                None => invoices.push(invoice.clone()),
            }
            Ok(())
        }

        async fn list_invoices(
            &self,
            account_id: &AccountId,
        ) -> Result<Vec<Invoice>, DomainError> {
            let invoices = self.invoices.lock().unwrap();
            Ok(invoices
                .iter()
                .filter(|i| &i.account_id == account_id)
                .cloned()
                .collect())
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Payment Gateway Mock
    // ════════════════════════════════════════════════════════════════════════════

    #[derive(Clone, Copy)]
    enum GatewayMode {
        Ok,
        Rejected,
        Unavailable,
    }

    pub struct MockPaymentGateway {
        mode: GatewayMode,
        status: Mutex<String>,
        pub calls: Mutex<Vec<String>>,
        payment_methods: Vec<PaymentMethodSummary>,
    }

    impl MockPaymentGateway {
        pub fn new() -> Self {
            Self {
                mode: GatewayMode::Ok,
                status: Mutex::new("incomplete".to_string()),
                calls: Mutex::new(Vec::new()),
                payment_methods: Vec::new(),
            }
        }

        pub fn rejecting() -> Self {
            Self {
                mode: GatewayMode::Rejected,
                ..Self::new()
            }
        }

        pub fn unavailable() -> Self {
            Self {
                mode: GatewayMode::Unavailable,
                ..Self::new()
            }
        }

        pub fn with_status(self, status: &str) -> Self {
            *self.status.lock().unwrap() = status.to_string();
            self
        }

        pub fn with_payment_methods(mut self, methods: Vec<PaymentMethodSummary>) -> Self {
            self.payment_methods = methods;
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn respond(&self, call: &str, status: &str) -> Result<GatewaySubscription, GatewayError> {
            self.calls.lock().unwrap().push(call.to_string());
            match self.mode {
                GatewayMode::Ok => {
                    let now = Timestamp::now().as_unix_secs();
                    Ok(GatewaySubscription {
                        id: "sub_mock_1".to_string(),
                        customer: "cus_mock_1".to_string(),
                        status: status.to_string(),
                        current_period_start: now,
                        current_period_end: now + 30 * 86400,
                        trial_end: None,
                        cancel_at_period_end: call == "cancel_at_period_end",
                    })
                }
                GatewayMode::Rejected => {
                    Err(GatewayError::Rejected("Simulated rejection".to_string()))
                }
                GatewayMode::Unavailable => {
                    Err(GatewayError::Unavailable("Simulated outage".to_string()))
                }
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for MockPaymentGateway {
        async fn create_subscription(
            &self,
            _customer_id: &str,
            _price_reference: &str,
            _trial_end: Option<i64>,
        ) -> Result<GatewaySubscription, GatewayError> {
            let status = self.status.lock().unwrap().clone();
            self.respond("create", &status)
        }

        async fn cancel_subscription_now(
            &self,
            _subscription_id: &str,
        ) -> Result<GatewaySubscription, GatewayError> {
            self.respond("cancel_now", "canceled")
        }

        async fn cancel_subscription_at_period_end(
            &self,
            _subscription_id: &str,
        ) -> Result<GatewaySubscription, GatewayError> {
            self.respond("cancel_at_period_end", "active")
        }

        async fn resume_subscription(
            &self,
            _subscription_id: &str,
        ) -> Result<GatewaySubscription, GatewayError> {
            self.respond("resume", "active")
        }

        async fn list_payment_methods(
            &self,
            _customer_id: &str,
        ) -> Result<Vec<PaymentMethodSummary>, GatewayError> {
            self.calls.lock().unwrap().push("list_payment_methods".to_string());
            match self.mode {
                GatewayMode::Ok => Ok(self.payment_methods.clone()),
                GatewayMode::Rejected => {
                    Err(GatewayError::Rejected("Simulated rejection".to_string()))
                }
                GatewayMode::Unavailable => {
                    Err(GatewayError::Unavailable("Simulated outage".to_string()))
                }
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Notification Emitter Mock
    // ════════════════════════════════════════════════════════════════════════════

    pub struct RecordingEmitter {
        pub notifications: Mutex<Vec<Notification>>,
        fail_emit: bool,
    }

    impl RecordingEmitter {
        pub fn new() -> Self {
            Self {
                notifications: Mutex::new(Vec::new()),
                fail_emit: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                notifications: Mutex::new(Vec::new()),
                fail_emit: true,
            }
        }

        pub fn emitted(&self) -> Vec<Notification> {
            self.notifications.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationEmitter for RecordingEmitter {
        async fn emit(&self, notification: &Notification) -> Result<(), DomainError> {
            if self.fail_emit {
                return Err(DomainError::new(
                    ErrorCode::InternalError,
                    "Simulated emit failure",
                ));
            }
            self.notifications.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Processed Event Ledger Mock
    // ════════════════════════════════════════════════════════════════════════════

    pub struct MockEventLedger {
        pub records: Mutex<Vec<ProcessedEventRecord>>,
    }

    impl MockEventLedger {
        pub fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProcessedEventStore for MockEventLedger {
        async fn save(&self, record: &ProcessedEventRecord) -> Result<SaveResult, DomainError> {
            let mut records = self.records.lock().unwrap();
            if records.iter().any(|r| r.event_id == record.event_id) {
                return Ok(SaveResult::AlreadyExists);
            }
            records.push(record.clone());
            Ok(SaveResult::Inserted)
        }

        async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|r| !r.processed_at.is_before(&cutoff));
            Ok((before - records.len()) as u64)
        }
    }
}
