//! NotificationEmitter port - fire-and-forget account notifications.
//!
//! Notifications tell the account holder about lifecycle changes
//! (payment failed, subscription canceled, and so on). They are emitted
//! AFTER the state change commits and are best-effort: a failed emit is
//! logged and swallowed, never propagated, so notification trouble can
//! never fail a webhook acknowledgment or a command.

use async_trait::async_trait;

use crate::domain::foundation::{AccountId, DomainError, SubscriptionId, Timestamp};

/// Lifecycle changes worth telling the account holder about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// First successful payment; the subscription is live.
    SubscriptionActivated,
    /// Cancellation scheduled for the end of the current period.
    CancellationScheduled,
    /// The subscription has ended.
    SubscriptionCanceled,
    /// A scheduled cancellation was cleared.
    Reactivated,
    /// A payment failed; the provider is retrying.
    PaymentFailed,
    /// Payment recovered after a failure.
    PaymentRecovered,
}

impl NotificationKind {
    /// Stable identifier for storage and templating.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::SubscriptionActivated => "subscription_activated",
            NotificationKind::CancellationScheduled => "cancellation_scheduled",
            NotificationKind::SubscriptionCanceled => "subscription_canceled",
            NotificationKind::Reactivated => "reactivated",
            NotificationKind::PaymentFailed => "payment_failed",
            NotificationKind::PaymentRecovered => "payment_recovered",
        }
    }
}

/// A notification about a subscription lifecycle change.
#[derive(Debug, Clone)]
pub struct Notification {
    pub account_id: AccountId,
    pub subscription_id: SubscriptionId,
    pub kind: NotificationKind,
    pub occurred_at: Timestamp,
}

impl Notification {
    pub fn new(
        account_id: AccountId,
        subscription_id: SubscriptionId,
        kind: NotificationKind,
    ) -> Self {
        Self {
            account_id,
            subscription_id,
            kind,
            occurred_at: Timestamp::now(),
        }
    }
}

/// Port for emitting account notifications.
#[async_trait]
pub trait NotificationEmitter: Send + Sync {
    /// Emit a notification.
    ///
    /// Callers treat failures as non-fatal; implementations should
    /// still return them so the caller can log.
    async fn emit(&self, notification: &Notification) -> Result<(), DomainError>;
}
