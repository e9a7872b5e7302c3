//! Subscription aggregate entity.
//!
//! The Subscription aggregate is the local mirror of a billing provider
//! subscription. Each account has at most one Subscription row; the
//! provider remains the source of truth and webhook events reconcile
//! this mirror toward it.
//!
//! # Design Decisions
//!
//! - **One per account**: Unique constraint on account_id enforced at
//!   database level
//! - **Money in cents**: All monetary values stored as i64 cents
//! - **Versioned writes**: Every mutation goes through a compare-and-swap
//!   on `version`, so concurrent event deliveries cannot silently
//!   overwrite each other
//! - **Guarded transitions**: Status changes go through the state machine

use crate::domain::foundation::{
    AccountId, DomainError, ErrorCode, SubscriptionId, Timestamp,
};
use serde::{Deserialize, Serialize};

use super::SubscriptionStatus;

/// Summary of the card on file, denormalized from the provider.
///
/// Kept on the aggregate so the UI can render "Visa ending 4242"
/// without a provider round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodSnapshot {
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
}

/// Subscription aggregate - local mirror of a provider subscription.
///
/// # Invariants
///
/// - `id` is globally unique
/// - `account_id` is unique (one subscription per account)
/// - Status transitions follow state machine rules
/// - `cancel_at_period_end` is only true while the status is in the
///   active family
/// - `canceled_at` is set if and only if the status is Canceled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier for this subscription.
    pub id: SubscriptionId,

    /// Account that owns this subscription.
    pub account_id: AccountId,

    /// Provider-side subscription ID, set once the provider has created
    /// its record.
    pub provider_subscription_id: Option<String>,

    /// Provider-side customer ID.
    pub provider_customer_id: String,

    /// Current status in the subscription lifecycle.
    pub status: SubscriptionStatus,

    /// Start of current billing period.
    pub current_period_start: Timestamp,

    /// End of current billing period.
    pub current_period_end: Timestamp,

    /// When the trial ends, if the subscription started with one.
    pub trial_end: Option<Timestamp>,

    /// True when cancellation is scheduled for the end of the current
    /// period.
    pub cancel_at_period_end: bool,

    /// When the subscription was canceled (if canceled).
    pub canceled_at: Option<Timestamp>,

    /// Why the subscription was canceled (if a reason was given).
    pub cancellation_reason: Option<String>,

    /// Provider price this subscription bills against.
    pub price_reference: String,

    /// Card summary for display, refreshed from provider payloads.
    pub payment_method_snapshot: Option<PaymentMethodSnapshot>,

    /// Version the aggregate was read at. Writes commit version + 1
    /// only if the stored row still has this version.
    pub version: i64,

    /// When the subscription was created.
    pub created_at: Timestamp,

    /// When the subscription was last updated.
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Create a new subscription awaiting its first payment.
    ///
    /// Subscriptions start Incomplete (or Trialing if a trial end is
    /// given) until the provider confirms payment.
    pub fn create(
        id: SubscriptionId,
        account_id: AccountId,
        provider_customer_id: String,
        price_reference: String,
        trial_end: Option<Timestamp>,
    ) -> Result<Self, DomainError> {
        if price_reference.is_empty() {
            return Err(DomainError::validation(
                "price_reference",
                "Price reference cannot be empty",
            ));
        }
        if provider_customer_id.is_empty() {
            return Err(DomainError::validation(
                "provider_customer_id",
                "Provider customer ID cannot be empty",
            ));
        }

        let now = Timestamp::now();
        let status = if trial_end.is_some() {
            SubscriptionStatus::Trialing
        } else {
            SubscriptionStatus::Incomplete
        };

        Ok(Self {
            id,
            account_id,
            provider_subscription_id: None,
            provider_customer_id,
            status,
            current_period_start: now,
            current_period_end: now, // Set when the provider confirms
            trial_end,
            cancel_at_period_end: false,
            canceled_at: None,
            cancellation_reason: None,
            price_reference,
            payment_method_snapshot: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Check if this subscription counts as live.
    pub fn is_active_family(&self) -> bool {
        self.status.is_active_family()
    }

    /// Check if this subscription has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        use crate::domain::foundation::StateMachine;
        self.status.is_terminal()
    }

    /// Activate this subscription after the provider confirms payment.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn activate(
        &mut self,
        period_start: Timestamp,
        period_end: Timestamp,
        provider_subscription_id: Option<String>,
    ) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Active)?;
        self.current_period_start = period_start;
        self.current_period_end = period_end;
        if let Some(sub_id) = provider_subscription_id {
            self.provider_subscription_id = Some(sub_id);
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Begin a trial period.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn start_trial(
        &mut self,
        trial_end: Timestamp,
        provider_subscription_id: Option<String>,
    ) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Trialing)?;
        self.trial_end = Some(trial_end);
        if let Some(sub_id) = provider_subscription_id {
            self.provider_subscription_id = Some(sub_id);
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Renew the subscription for a new billing period.
    ///
    /// # Errors
    ///
    /// Returns error if current status doesn't allow renewal.
    pub fn renew(
        &mut self,
        period_start: Timestamp,
        period_end: Timestamp,
    ) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Active)?;
        self.current_period_start = period_start;
        self.current_period_end = period_end;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Mark payment as past due (failed but the provider is retrying).
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn mark_past_due(&mut self) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::PastDue)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Recover from past due status after successful payment.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn recover_payment(&mut self, period_end: Timestamp) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Active)?;
        self.current_period_end = period_end;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Schedule cancellation for the end of the current period.
    ///
    /// The subscription stays in its current status until the provider
    /// ends it; only the flag changes here.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription is not in the active family.
    pub fn schedule_cancellation(&mut self, reason: Option<String>) -> Result<(), DomainError> {
        if !self.is_active_family() {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot schedule cancellation from status {:?}",
                    self.status
                ),
            ));
        }
        self.cancel_at_period_end = true;
        if reason.is_some() {
            self.cancellation_reason = reason;
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Clear a previously scheduled cancellation.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription is not in the active family.
    pub fn clear_scheduled_cancellation(&mut self) -> Result<(), DomainError> {
        if !self.is_active_family() {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot clear scheduled cancellation from status {:?}",
                    self.status
                ),
            ));
        }
        self.cancel_at_period_end = false;
        self.cancellation_reason = None;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Cancel this subscription immediately.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn cancel_now(&mut self, reason: Option<String>) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Canceled)?;
        self.cancel_at_period_end = false;
        self.canceled_at = Some(Timestamp::now());
        if reason.is_some() {
            self.cancellation_reason = reason;
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// End the subscription after payment retries were exhausted.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn expire_unpaid(&mut self) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Unpaid)?;
        self.cancel_at_period_end = false;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Refresh the denormalized card summary from a provider payload.
    pub fn refresh_payment_method(&mut self, snapshot: Option<PaymentMethodSnapshot>) {
        self.payment_method_snapshot = snapshot;
        self.updated_at = Timestamp::now();
    }

    /// Update the billing period boundaries without a status change.
    pub fn update_period(&mut self, period_start: Timestamp, period_end: Timestamp) {
        self.current_period_start = period_start;
        self.current_period_end = period_end;
        self.updated_at = Timestamp::now();
    }

    /// Days remaining in current period.
    ///
    /// Returns 0 if period has ended.
    pub fn days_remaining(&self) -> u32 {
        let now = Timestamp::now();
        if now >= self.current_period_end {
            return 0;
        }

        let duration = self.current_period_end.duration_since(&now);
        duration.num_days().max(0) as u32
    }

    /// Transition to a new status using the state machine.
    fn transition_to(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        use crate::domain::foundation::StateMachine;

        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition subscription from {:?} to {:?}",
                    self.status, target
                ),
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_subscription() -> Subscription {
        Subscription::create(
            SubscriptionId::new(),
            AccountId::new(),
            "cus_123".to_string(),
            "price_123".to_string(),
            None,
        )
        .unwrap()
    }

    fn period_start() -> Timestamp {
        Timestamp::now()
    }

    fn period_end() -> Timestamp {
        Timestamp::now().add_days(30)
    }

    // Construction tests

    #[test]
    fn create_starts_incomplete() {
        let sub = test_subscription();

        assert_eq!(sub.status, SubscriptionStatus::Incomplete);
        assert_eq!(sub.provider_customer_id, "cus_123");
        assert!(sub.provider_subscription_id.is_none());
        assert!(!sub.cancel_at_period_end);
        assert_eq!(sub.version, 0);
    }

    #[test]
    fn create_with_trial_starts_trialing() {
        let sub = Subscription::create(
            SubscriptionId::new(),
            AccountId::new(),
            "cus_123".to_string(),
            "price_123".to_string(),
            Some(Timestamp::now().add_days(14)),
        )
        .unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Trialing);
        assert!(sub.trial_end.is_some());
    }

    #[test]
    fn create_rejects_empty_price_reference() {
        let result = Subscription::create(
            SubscriptionId::new(),
            AccountId::new(),
            "cus_123".to_string(),
            String::new(),
            None,
        );

        assert!(result.is_err());
    }

    #[test]
    fn create_rejects_empty_customer_id() {
        let result = Subscription::create(
            SubscriptionId::new(),
            AccountId::new(),
            String::new(),
            "price_123".to_string(),
            None,
        );

        assert!(result.is_err());
    }

    // Lifecycle transition tests

    #[test]
    fn incomplete_can_activate() {
        let mut sub = test_subscription();

        let result = sub.activate(period_start(), period_end(), Some("sub_123".to_string()));
        assert!(result.is_ok());
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.provider_subscription_id, Some("sub_123".to_string()));
    }

    #[test]
    fn active_can_go_past_due() {
        let mut sub = test_subscription();
        sub.activate(period_start(), period_end(), None).unwrap();

        let result = sub.mark_past_due();
        assert!(result.is_ok());
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
    }

    #[test]
    fn past_due_can_recover() {
        let mut sub = test_subscription();
        sub.activate(period_start(), period_end(), None).unwrap();
        sub.mark_past_due().unwrap();

        let new_end = Timestamp::now().add_days(30);
        let result = sub.recover_payment(new_end);
        assert!(result.is_ok());
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.current_period_end, new_end);
    }

    #[test]
    fn active_can_renew_with_new_period() {
        let mut sub = test_subscription();
        sub.activate(period_start(), period_end(), None).unwrap();

        let new_start = Timestamp::now().add_days(30);
        let new_end = new_start.add_days(30);
        let result = sub.renew(new_start, new_end);
        assert!(result.is_ok());
        assert_eq!(sub.current_period_start, new_start);
        assert_eq!(sub.current_period_end, new_end);
    }

    #[test]
    fn incomplete_cannot_go_past_due() {
        let mut sub = test_subscription();
        assert!(sub.mark_past_due().is_err());
        assert_eq!(sub.status, SubscriptionStatus::Incomplete);
    }

    // Cancellation tests

    #[test]
    fn cancel_now_sets_canceled_at_and_clears_flag() {
        let mut sub = test_subscription();
        sub.activate(period_start(), period_end(), None).unwrap();
        sub.schedule_cancellation(None).unwrap();

        let result = sub.cancel_now(Some("too expensive".to_string()));
        assert!(result.is_ok());
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        assert!(sub.canceled_at.is_some());
        assert!(!sub.cancel_at_period_end);
        assert_eq!(sub.cancellation_reason, Some("too expensive".to_string()));
    }

    #[test]
    fn schedule_cancellation_keeps_status() {
        let mut sub = test_subscription();
        sub.activate(period_start(), period_end(), None).unwrap();

        let result = sub.schedule_cancellation(Some("switching plans".to_string()));
        assert!(result.is_ok());
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(sub.cancel_at_period_end);
        assert!(sub.canceled_at.is_none());
    }

    #[test]
    fn schedule_cancellation_rejected_on_incomplete() {
        let mut sub = test_subscription();
        assert!(sub.schedule_cancellation(None).is_err());
        assert!(!sub.cancel_at_period_end);
    }

    #[test]
    fn clear_scheduled_cancellation_resets_flag_and_reason() {
        let mut sub = test_subscription();
        sub.activate(period_start(), period_end(), None).unwrap();
        sub.schedule_cancellation(Some("changed my mind later".to_string()))
            .unwrap();

        let result = sub.clear_scheduled_cancellation();
        assert!(result.is_ok());
        assert!(!sub.cancel_at_period_end);
        assert!(sub.cancellation_reason.is_none());
    }

    #[test]
    fn canceled_subscription_is_terminal() {
        let mut sub = test_subscription();
        sub.activate(period_start(), period_end(), None).unwrap();
        sub.cancel_now(None).unwrap();

        assert!(sub.is_terminal());
        assert!(sub.activate(period_start(), period_end(), None).is_err());
        assert!(sub.mark_past_due().is_err());
    }

    #[test]
    fn past_due_can_expire_unpaid() {
        let mut sub = test_subscription();
        sub.activate(period_start(), period_end(), None).unwrap();
        sub.mark_past_due().unwrap();

        let result = sub.expire_unpaid();
        assert!(result.is_ok());
        assert_eq!(sub.status, SubscriptionStatus::Unpaid);
        assert!(sub.is_terminal());
    }

    // Snapshot tests

    #[test]
    fn refresh_payment_method_replaces_snapshot() {
        let mut sub = test_subscription();

        sub.refresh_payment_method(Some(PaymentMethodSnapshot {
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            exp_month: 12,
            exp_year: 2030,
        }));

        assert_eq!(
            sub.payment_method_snapshot.as_ref().map(|s| s.last4.as_str()),
            Some("4242")
        );

        sub.refresh_payment_method(None);
        assert!(sub.payment_method_snapshot.is_none());
    }
}
