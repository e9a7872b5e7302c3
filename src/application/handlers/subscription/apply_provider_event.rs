//! ApplyProviderEventHandler - applies verified webhook events to the
//! local subscription mirror.
//!
//! ## Design
//!
//! 1. Record the event in the idempotency ledger FIRST. The unique
//!    constraint is the gate: a duplicate delivery sees `AlreadyExists`
//!    and is acknowledged without being applied.
//! 2. Dispatch on the event type and apply guarded transitions. An
//!    event that arrives late or out of order (e.g. a payment failure
//!    for an already-canceled subscription) is ignored and
//!    acknowledged, never an error, so the stored state cannot be
//!    corrupted by delivery order.
//! 3. Emit notifications only after the write committed.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::foundation::{StateMachine, Timestamp};
use crate::domain::subscription::{
    Invoice, PaymentMethodSnapshot, ProviderEvent, ProviderEventType, Subscription,
    SubscriptionStatus, WebhookError,
};
use crate::ports::{
    CasOutcome, Notification, NotificationEmitter, NotificationKind, ProcessedEventRecord,
    ProcessedEventStore, SubscriptionStore,
};

use super::MAX_CAS_ATTEMPTS;

/// What became of a delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// First delivery; the event changed local state.
    Applied,
    /// The event was already in the ledger; nothing was applied.
    Duplicate,
    /// First delivery, but the event was not relevant (unknown type,
    /// stale transition, terminal subscription).
    Ignored,
}

/// Subscription object fields this service reads from webhook payloads.
#[derive(Debug, Deserialize)]
struct SubscriptionPayload {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    trial_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    default_payment_method: Option<PaymentMethodPayload>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodPayload {
    #[serde(default)]
    card: Option<CardPayload>,
}

#[derive(Debug, Deserialize)]
struct CardPayload {
    brand: String,
    last4: String,
    exp_month: u8,
    exp_year: u16,
}

/// Invoice object fields this service reads from webhook payloads.
#[derive(Debug, Deserialize)]
struct InvoicePayload {
    id: String,
    subscription: String,
    #[serde(default)]
    amount_paid: Option<i64>,
    #[serde(default)]
    amount_due: Option<i64>,
    currency: String,
    #[serde(default)]
    hosted_invoice_url: Option<String>,
    #[serde(default)]
    invoice_pdf: Option<String>,
    #[serde(default)]
    period_start: Option<i64>,
    #[serde(default)]
    period_end: Option<i64>,
}

impl SubscriptionPayload {
    fn snapshot(&self) -> Option<PaymentMethodSnapshot> {
        self.default_payment_method
            .as_ref()
            .and_then(|pm| pm.card.as_ref())
            .map(|card| PaymentMethodSnapshot {
                brand: card.brand.clone(),
                last4: card.last4.clone(),
                exp_month: card.exp_month,
                exp_year: card.exp_year,
            })
    }
}

/// Handler for verified provider webhook events.
pub struct ApplyProviderEventHandler {
    store: Arc<dyn SubscriptionStore>,
    ledger: Arc<dyn ProcessedEventStore>,
    emitter: Arc<dyn NotificationEmitter>,
}

impl ApplyProviderEventHandler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        ledger: Arc<dyn ProcessedEventStore>,
        emitter: Arc<dyn NotificationEmitter>,
    ) -> Self {
        Self {
            store,
            ledger,
            emitter,
        }
    }

    /// Process a webhook event at most once.
    pub async fn handle(&self, event: ProviderEvent) -> Result<EventOutcome, WebhookError> {
        // 1. The ledger insert is the idempotency gate
        let record = ProcessedEventRecord {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            processed_at: Timestamp::now(),
            payload: serde_json::to_value(&event)
                .map_err(|e| WebhookError::ParseError(format!("Failed to serialize event: {}", e)))?,
        };
        if self.ledger.save(&record).await? == crate::ports::SaveResult::AlreadyExists {
            info!(event_id = %event.id, "Duplicate event delivery, skipping");
            return Ok(EventOutcome::Duplicate);
        }

        // 2. Dispatch; stale or irrelevant events are acknowledged
        match self.dispatch(&event).await {
            Ok(outcome) => Ok(outcome),
            Err(WebhookError::Ignored(reason)) => {
                info!(event_id = %event.id, event_type = %event.event_type, reason = %reason, "Event ignored");
                Ok(EventOutcome::Ignored)
            }
            Err(e) => Err(e),
        }
    }

    async fn dispatch(&self, event: &ProviderEvent) -> Result<EventOutcome, WebhookError> {
        match event.parsed_type() {
            ProviderEventType::SubscriptionCreated | ProviderEventType::SubscriptionUpdated => {
                self.apply_subscription_update(event).await
            }
            ProviderEventType::SubscriptionDeleted => {
                self.apply_subscription_deleted(event).await
            }
            ProviderEventType::InvoicePaid => self.apply_invoice_paid(event).await,
            ProviderEventType::InvoicePaymentFailed => self.apply_invoice_failed(event).await,
            ProviderEventType::Unknown => Err(WebhookError::Ignored(format!(
                "No handler for event type: {}",
                event.event_type
            ))),
        }
    }

    // ── subscription.created / subscription.updated ─────────────────

    async fn apply_subscription_update(
        &self,
        event: &ProviderEvent,
    ) -> Result<EventOutcome, WebhookError> {
        let payload: SubscriptionPayload = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let mut current = self.find_subscription(&payload.id).await?;
        if current.status.is_terminal() {
            return Err(WebhookError::Ignored(
                "Subscription is terminal, update dropped".to_string(),
            ));
        }

        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut updated = current.clone();
            let newly_scheduled =
                payload.cancel_at_period_end && !updated.cancel_at_period_end;

            Self::sync_from_payload(&mut updated, &payload);

            match self.store.update(&updated).await? {
                CasOutcome::Committed => {
                    updated.version += 1;
                    if newly_scheduled {
                        self.notify(&updated, NotificationKind::CancellationScheduled)
                            .await;
                    }
                    return Ok(EventOutcome::Applied);
                }
                CasOutcome::VersionConflict => {
                    current = self.find_subscription(&payload.id).await?;
                    if current.status.is_terminal() {
                        return Err(WebhookError::Ignored(
                            "Subscription became terminal during update".to_string(),
                        ));
                    }
                }
            }
        }
        Err(WebhookError::Database(
            "Version conflict retries exhausted".to_string(),
        ))
    }

    /// Refreshes mirror fields from a subscription payload.
    ///
    /// Status changes are guard-conditioned: a target the state machine
    /// rejects is dropped while the rest of the sync still applies.
    fn sync_from_payload(subscription: &mut Subscription, payload: &SubscriptionPayload) {
        if let (Some(start), Some(end)) =
            (payload.current_period_start, payload.current_period_end)
        {
            subscription.update_period(
                Timestamp::from_unix_secs(start),
                Timestamp::from_unix_secs(end),
            );
        }
        subscription.trial_end = payload.trial_end.map(Timestamp::from_unix_secs);
        if let Some(snapshot) = payload.snapshot() {
            subscription.refresh_payment_method(Some(snapshot));
        }

        if payload.cancel_at_period_end != subscription.cancel_at_period_end {
            let result = if payload.cancel_at_period_end {
                subscription.schedule_cancellation(None)
            } else {
                subscription.clear_scheduled_cancellation()
            };
            if result.is_err() {
                warn!(
                    subscription_id = %subscription.id,
                    "Dropped cancel_at_period_end sync for non-live subscription"
                );
            }
        }

        if let Some(target) = payload
            .status
            .as_deref()
            .and_then(SubscriptionStatus::from_provider)
        {
            if target != subscription.status {
                let result = match target {
                    SubscriptionStatus::Canceled => subscription.cancel_now(None),
                    SubscriptionStatus::Unpaid => subscription.expire_unpaid(),
                    SubscriptionStatus::PastDue => subscription.mark_past_due(),
                    SubscriptionStatus::Active | SubscriptionStatus::Trialing => {
                        match subscription.status.transition_to(target) {
                            Ok(next) => {
                                subscription.status = next;
                                Ok(())
                            }
                            Err(e) => Err(crate::domain::foundation::DomainError::validation(
                                "status",
                                e.to_string(),
                            )),
                        }
                    }
                    SubscriptionStatus::Incomplete => return,
                };
                if result.is_err() {
                    info!(
                        subscription_id = %subscription.id,
                        from = subscription.status.as_str(),
                        to = target.as_str(),
                        "Dropped invalid status transition from provider payload"
                    );
                }
            }
        }
    }

    // ── subscription.deleted ────────────────────────────────────────

    async fn apply_subscription_deleted(
        &self,
        event: &ProviderEvent,
    ) -> Result<EventOutcome, WebhookError> {
        let payload: SubscriptionPayload = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let mut current = self.find_subscription(&payload.id).await?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            if current.status.is_terminal() {
                return Err(WebhookError::Ignored(
                    "Subscription already terminal".to_string(),
                ));
            }

            let mut updated = current.clone();
            updated
                .cancel_now(None)
                .map_err(|e| WebhookError::InvalidTransition(e.to_string()))?;

            match self.store.update(&updated).await? {
                CasOutcome::Committed => {
                    updated.version += 1;
                    self.notify(&updated, NotificationKind::SubscriptionCanceled)
                        .await;
                    return Ok(EventOutcome::Applied);
                }
                CasOutcome::VersionConflict => {
                    current = self.find_subscription(&payload.id).await?;
                }
            }
        }
        Err(WebhookError::Database(
            "Version conflict retries exhausted".to_string(),
        ))
    }

    // ── invoice.paid ────────────────────────────────────────────────

    async fn apply_invoice_paid(
        &self,
        event: &ProviderEvent,
    ) -> Result<EventOutcome, WebhookError> {
        let payload: InvoicePayload = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let mut current = self.find_subscription(&payload.subscription).await?;

        let invoice = Invoice::paid(
            payload.id.clone(),
            current.id,
            current.account_id,
            payload.amount_paid.unwrap_or(0),
            payload.currency.clone(),
            payload.hosted_invoice_url.clone(),
            payload.invoice_pdf.clone(),
            Timestamp::from_unix_secs(event.created),
        );
        self.store.upsert_invoice(&invoice).await?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            if current.status.is_terminal() {
                // Invoice recorded, but a dead subscription never revives
                return Err(WebhookError::Ignored(
                    "Subscription is terminal, payment recorded only".to_string(),
                ));
            }

            let period_start = payload
                .period_start
                .map(Timestamp::from_unix_secs)
                .unwrap_or(current.current_period_start);
            let period_end = payload
                .period_end
                .map(Timestamp::from_unix_secs)
                .unwrap_or(current.current_period_end);

            let mut updated = current.clone();
            let notification = match updated.status {
                SubscriptionStatus::PastDue => {
                    updated
                        .recover_payment(period_end)
                        .map_err(|e| WebhookError::InvalidTransition(e.to_string()))?;
                    Some(NotificationKind::PaymentRecovered)
                }
                SubscriptionStatus::Incomplete | SubscriptionStatus::Trialing => {
                    updated
                        .activate(period_start, period_end, None)
                        .map_err(|e| WebhookError::InvalidTransition(e.to_string()))?;
                    Some(NotificationKind::SubscriptionActivated)
                }
                SubscriptionStatus::Active => {
                    // Renewal, no notification
                    updated
                        .renew(period_start, period_end)
                        .map_err(|e| WebhookError::InvalidTransition(e.to_string()))?;
                    None
                }
                SubscriptionStatus::Canceled | SubscriptionStatus::Unpaid => unreachable!(),
            };

            match self.store.update(&updated).await? {
                CasOutcome::Committed => {
                    updated.version += 1;
                    if let Some(kind) = notification {
                        self.notify(&updated, kind).await;
                    }
                    return Ok(EventOutcome::Applied);
                }
                CasOutcome::VersionConflict => {
                    current = self.find_subscription(&payload.subscription).await?;
                }
            }
        }
        Err(WebhookError::Database(
            "Version conflict retries exhausted".to_string(),
        ))
    }

    // ── invoice.payment_failed ──────────────────────────────────────

    async fn apply_invoice_failed(
        &self,
        event: &ProviderEvent,
    ) -> Result<EventOutcome, WebhookError> {
        let payload: InvoicePayload = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let mut current = self.find_subscription(&payload.subscription).await?;

        let invoice = Invoice::failed(
            payload.id.clone(),
            current.id,
            current.account_id,
            payload.amount_due.unwrap_or(0),
            payload.currency.clone(),
            payload.hosted_invoice_url.clone(),
        );
        self.store.upsert_invoice(&invoice).await?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            match current.status {
                SubscriptionStatus::PastDue => {
                    return Err(WebhookError::Ignored(
                        "Subscription already past due".to_string(),
                    ));
                }
                SubscriptionStatus::Trialing | SubscriptionStatus::Active => {}
                _ => {
                    return Err(WebhookError::Ignored(format!(
                        "Payment failure not applicable in status {}",
                        current.status.as_str()
                    )));
                }
            }

            let mut updated = current.clone();
            updated
                .mark_past_due()
                .map_err(|e| WebhookError::InvalidTransition(e.to_string()))?;

            match self.store.update(&updated).await? {
                CasOutcome::Committed => {
                    updated.version += 1;
                    self.notify(&updated, NotificationKind::PaymentFailed).await;
                    return Ok(EventOutcome::Applied);
                }
                CasOutcome::VersionConflict => {
                    current = self.find_subscription(&payload.subscription).await?;
                }
            }
        }
        Err(WebhookError::Database(
            "Version conflict retries exhausted".to_string(),
        ))
    }

    // ── helpers ─────────────────────────────────────────────────────

    async fn find_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Subscription, WebhookError> {
        self.store
            .find_by_provider_subscription_id(provider_subscription_id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)
    }

    /// Best-effort notification after the write committed.
    async fn notify(&self, subscription: &Subscription, kind: NotificationKind) {
        let notification = Notification::new(subscription.account_id, subscription.id, kind);
        if let Err(e) = self.emitter.emit(&notification).await {
            warn!(
                account_id = %subscription.account_id,
                kind = kind.as_str(),
                error = %e,
                "Failed to emit notification"
            );
        }
    }
}
