//! CancelSubscriptionHandler - Command handler for cancelling subscriptions.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::foundation::AccountId;
use crate::domain::subscription::{Subscription, SubscriptionError, SubscriptionStatus};
use crate::ports::{
    CasOutcome, Notification, NotificationEmitter, NotificationKind, PaymentGateway,
    SubscriptionStore,
};

use super::MAX_CAS_ATTEMPTS;

/// Command to cancel a subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub account_id: AccountId,
    /// When true the subscription stays live until the period ends;
    /// when false it is canceled immediately.
    pub at_period_end: bool,
    pub reason: Option<String>,
}

/// Handler for cancelling subscriptions.
///
/// The provider is told first; the local row is only updated after the
/// provider accepts. Cancelling an already-Canceled subscription is a
/// no-op success so retried requests don't error.
pub struct CancelSubscriptionHandler {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
    emitter: Arc<dyn NotificationEmitter>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn PaymentGateway>,
        emitter: Arc<dyn NotificationEmitter>,
    ) -> Self {
        Self {
            store,
            gateway,
            emitter,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<Subscription, SubscriptionError> {
        // 1. Find the account's subscription and check its state
        let subscription = self
            .store
            .find_by_account(&cmd.account_id)
            .await?
            .ok_or(SubscriptionError::NotFound)?;

        if let Some(done) = Self::check_state(&subscription)? {
            return Ok(done);
        }

        let provider_id = subscription
            .provider_subscription_id
            .clone()
            .ok_or_else(|| {
                SubscriptionError::Validation(
                    "Subscription has no provider subscription ID".to_string(),
                )
            })?;

        // 2. Tell the provider first
        if cmd.at_period_end {
            self.gateway
                .cancel_subscription_at_period_end(&provider_id)
                .await?;
        } else {
            self.gateway.cancel_subscription_now(&provider_id).await?;
        }

        info!(
            account_id = %cmd.account_id,
            provider_subscription_id = %provider_id,
            at_period_end = cmd.at_period_end,
            "Cancelled subscription at provider"
        );

        // 3. Apply locally with a compare-and-swap loop
        let mut current = subscription;
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut updated = current.clone();
            if cmd.at_period_end {
                updated
                    .schedule_cancellation(cmd.reason.clone())
                    .map_err(SubscriptionError::from)?;
            } else {
                updated
                    .cancel_now(cmd.reason.clone())
                    .map_err(SubscriptionError::from)?;
            }

            match self.store.update(&updated).await? {
                CasOutcome::Committed => {
                    updated.version += 1;
                    self.notify(&updated, cmd.at_period_end).await;
                    return Ok(updated);
                }
                CasOutcome::VersionConflict => {
                    current = self
                        .store
                        .find_by_account(&cmd.account_id)
                        .await?
                        .ok_or(SubscriptionError::NotFound)?;
                    if let Some(done) = Self::check_state(&current)? {
                        return Ok(done);
                    }
                }
            }
        }
        Err(SubscriptionError::Conflict)
    }

    /// Guard check, run before the provider is touched and again after
    /// every conflict re-read. Returns `Ok(Some(_))` when the command is
    /// already satisfied, `Err` when it can never be, `Ok(None)` to
    /// proceed. Only the active family has anything to cancel; an
    /// Incomplete row was never live and is reset through create instead.
    fn check_state(
        subscription: &Subscription,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        match subscription.status {
            SubscriptionStatus::Canceled => Ok(Some(subscription.clone())),
            SubscriptionStatus::Unpaid => Err(SubscriptionError::TerminalState(
                subscription.status.as_str().to_string(),
            )),
            SubscriptionStatus::Incomplete => Err(SubscriptionError::Validation(
                "Subscription has not been activated".to_string(),
            )),
            _ => Ok(None),
        }
    }

    /// Best-effort notification after the write committed.
    async fn notify(&self, subscription: &Subscription, at_period_end: bool) {
        let kind = if at_period_end {
            NotificationKind::CancellationScheduled
        } else {
            NotificationKind::SubscriptionCanceled
        };
        let notification = Notification::new(subscription.account_id, subscription.id, kind);
        if let Err(e) = self.emitter.emit(&notification).await {
            warn!(
                account_id = %subscription.account_id,
                kind = kind.as_str(),
                error = %e,
                "Failed to emit cancellation notification"
            );
        }
    }
}
