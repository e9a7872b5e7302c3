//! ReactivateSubscriptionHandler - clears a scheduled cancellation.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::foundation::AccountId;
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::{
    CasOutcome, Notification, NotificationEmitter, NotificationKind, PaymentGateway,
    SubscriptionStore,
};

use super::MAX_CAS_ATTEMPTS;

/// Command to reactivate a subscription with a pending cancellation.
#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionCommand {
    pub account_id: AccountId,
}

/// Handler for reactivating subscriptions.
///
/// Only a scheduled (not yet effective) cancellation can be undone. A
/// subscription that already ended must go through create again.
pub struct ReactivateSubscriptionHandler {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
    emitter: Arc<dyn NotificationEmitter>,
}

impl ReactivateSubscriptionHandler {
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
        cmd: ReactivateSubscriptionCommand,
    ) -> Result<Subscription, SubscriptionError> {
        // 1. Find the account's subscription and check its state
        let subscription = self
            .store
            .find_by_account(&cmd.account_id)
            .await?
            .ok_or(SubscriptionError::NotFound)?;

        if subscription.is_terminal() {
            return Err(SubscriptionError::TerminalState(
                subscription.status.as_str().to_string(),
            ));
        }

        // Nothing scheduled, nothing to undo
        if !subscription.cancel_at_period_end {
            return Ok(subscription);
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
        self.gateway.resume_subscription(&provider_id).await?;

        info!(
            account_id = %cmd.account_id,
            provider_subscription_id = %provider_id,
            "Resumed subscription at provider"
        );

        // 3. Apply locally with a compare-and-swap loop
        let mut current = subscription;
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut updated = current.clone();
            updated
                .clear_scheduled_cancellation()
                .map_err(SubscriptionError::from)?;

            match self.store.update(&updated).await? {
                CasOutcome::Committed => {
                    updated.version += 1;
                    self.notify(&updated).await;
                    return Ok(updated);
                }
                CasOutcome::VersionConflict => {
                    current = self
                        .store
                        .find_by_account(&cmd.account_id)
                        .await?
                        .ok_or(SubscriptionError::NotFound)?;
                    if current.is_terminal() {
                        // The provider ended it while we were retrying
                        return Err(SubscriptionError::TerminalState(
                            current.status.as_str().to_string(),
                        ));
                    }
                    if !current.cancel_at_period_end {
                        return Ok(current);
                    }
                }
            }
        }
        Err(SubscriptionError::Conflict)
    }

    async fn notify(&self, subscription: &Subscription) {
        let notification = Notification::new(
            subscription.account_id,
            subscription.id,
            NotificationKind::Reactivated,
        );
        if let Err(e) = self.emitter.emit(&notification).await {
            warn!(
                account_id = %subscription.account_id,
                error = %e,
                "Failed to emit reactivation notification"
            );
        }
    }
}
