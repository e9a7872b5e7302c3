//! CreateSubscriptionHandler - Command handler for starting a subscription.

use std::sync::Arc;

use tracing::info;

use crate::domain::foundation::{AccountId, SubscriptionId, Timestamp};
use crate::domain::subscription::{
    PaymentMethodSnapshot, Subscription, SubscriptionError, SubscriptionStatus,
};
use crate::ports::{CasOutcome, GatewaySubscription, PaymentGateway, SubscriptionStore};

use super::MAX_CAS_ATTEMPTS;

/// Command to create a subscription for an account.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub account_id: AccountId,
    pub provider_customer_id: String,
    pub price_reference: String,
    pub trial_end: Option<Timestamp>,
}

/// Handler for creating subscriptions.
///
/// The gateway call happens before the local write, so a subscription
/// row only ever reflects something the provider actually created. If
/// the account already has a row:
/// - live (active family): the command is rejected
/// - Incomplete or terminal: the row is reset to a fresh lifecycle,
///   keeping its identity and version chain
pub struct CreateSubscriptionHandler {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CreateSubscriptionHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn handle(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<Subscription, SubscriptionError> {
        if cmd.price_reference.is_empty() {
            return Err(SubscriptionError::Validation(
                "Price reference cannot be empty".to_string(),
            ));
        }
        if cmd.provider_customer_id.is_empty() {
            return Err(SubscriptionError::Validation(
                "Provider customer ID cannot be empty".to_string(),
            ));
        }

        // 1. Reject if the account already has a live subscription
        let existing = self.store.find_by_account(&cmd.account_id).await?;
        if let Some(ref sub) = existing {
            if sub.is_active_family() {
                return Err(SubscriptionError::AlreadyActive);
            }
        }

        // 2. Capture the card on file for display
        let snapshot = self.card_snapshot(&cmd.provider_customer_id).await?;

        // 3. Create at the provider
        let remote = self
            .gateway
            .create_subscription(
                &cmd.provider_customer_id,
                &cmd.price_reference,
                cmd.trial_end.map(|t| t.as_unix_secs()),
            )
            .await?;

        info!(
            account_id = %cmd.account_id,
            provider_subscription_id = %remote.id,
            status = %remote.status,
            "Created subscription at provider"
        );

        // 4. Build the local mirror and persist
        match existing {
            None => {
                let subscription =
                    self.fresh_subscription(&cmd, &remote, snapshot, None)?;
                self.store.insert(&subscription).await?;
                Ok(subscription)
            }
            Some(stale) => self.reset_row(&cmd, &remote, snapshot, stale).await,
        }
    }

    /// Builds a fresh aggregate from the command and the provider's view.
    ///
    /// When `reuse` is given the new lifecycle keeps the old row's
    /// identity so the unique account constraint and version chain hold.
    fn fresh_subscription(
        &self,
        cmd: &CreateSubscriptionCommand,
        remote: &GatewaySubscription,
        snapshot: Option<PaymentMethodSnapshot>,
        reuse: Option<&Subscription>,
    ) -> Result<Subscription, SubscriptionError> {
        let mut subscription = Subscription::create(
            reuse.map(|s| s.id).unwrap_or_else(SubscriptionId::new),
            cmd.account_id,
            cmd.provider_customer_id.clone(),
            cmd.price_reference.clone(),
            cmd.trial_end,
        )?;

        if let Some(old) = reuse {
            subscription.version = old.version;
            subscription.created_at = old.created_at;
        }

        // The provider's answer is authoritative for the starting state.
        subscription.status = SubscriptionStatus::from_provider(&remote.status)
            .ok_or_else(|| {
                SubscriptionError::Validation(format!(
                    "Unknown provider status: {}",
                    remote.status
                ))
            })?;
        subscription.provider_subscription_id = Some(remote.id.clone());
        subscription.current_period_start = Timestamp::from_unix_secs(remote.current_period_start);
        subscription.current_period_end = Timestamp::from_unix_secs(remote.current_period_end);
        subscription.trial_end = remote.trial_end.map(Timestamp::from_unix_secs);
        subscription.payment_method_snapshot = snapshot;

        Ok(subscription)
    }

    /// Replaces a dead row (Incomplete or terminal) with a new lifecycle.
    async fn reset_row(
        &self,
        cmd: &CreateSubscriptionCommand,
        remote: &GatewaySubscription,
        snapshot: Option<PaymentMethodSnapshot>,
        mut stale: Subscription,
    ) -> Result<Subscription, SubscriptionError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let subscription =
                self.fresh_subscription(cmd, remote, snapshot.clone(), Some(&stale))?;

            match self.store.update(&subscription).await? {
                CasOutcome::Committed => {
                    let mut committed = subscription;
                    committed.version += 1;
                    return Ok(committed);
                }
                CasOutcome::VersionConflict => {
                    stale = self
                        .store
                        .find_by_account(&cmd.account_id)
                        .await?
                        .ok_or(SubscriptionError::NotFound)?;
                    // A concurrent writer may have revived the row
                    if stale.is_active_family() {
                        return Err(SubscriptionError::AlreadyActive);
                    }
                }
            }
        }
        Err(SubscriptionError::Conflict)
    }

    /// Fetches the customer's first saved card, if any.
    async fn card_snapshot(
        &self,
        customer_id: &str,
    ) -> Result<Option<PaymentMethodSnapshot>, SubscriptionError> {
        let methods = self.gateway.list_payment_methods(customer_id).await?;
        Ok(methods.into_iter().next().map(|m| PaymentMethodSnapshot {
            brand: m.brand,
            last4: m.last4,
            exp_month: m.exp_month,
            exp_year: m.exp_year,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{MockPaymentGateway, MockSubscriptionStore};
    use super::*;
    use crate::ports::PaymentMethodSummary;

    fn command(account_id: AccountId) -> CreateSubscriptionCommand {
        CreateSubscriptionCommand {
            account_id,
            provider_customer_id: "cus_mock_1".to_string(),
            price_reference: "price_basic_monthly".to_string(),
            trial_end: None,
        }
    }

    fn visa() -> PaymentMethodSummary {
        PaymentMethodSummary {
            id: "pm_1".to_string(),
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            exp_month: 12,
            exp_year: 2030,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Success Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn creates_incomplete_subscription() {
        let store = Arc::new(MockSubscriptionStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let handler = CreateSubscriptionHandler::new(store.clone(), gateway);

        let account_id = AccountId::new();
        let result = handler.handle(command(account_id)).await.unwrap();

        assert_eq!(result.status, SubscriptionStatus::Incomplete);
        assert_eq!(result.provider_subscription_id, Some("sub_mock_1".to_string()));
        assert_eq!(store.stored().len(), 1);
        assert_eq!(store.stored()[0].account_id, account_id);
    }

    #[tokio::test]
    async fn maps_trialing_provider_status() {
        let store = Arc::new(MockSubscriptionStore::new());
        let gateway = Arc::new(MockPaymentGateway::new().with_status("trialing"));
        let handler = CreateSubscriptionHandler::new(store, gateway);

        let result = handler.handle(command(AccountId::new())).await.unwrap();

        assert_eq!(result.status, SubscriptionStatus::Trialing);
    }

    #[tokio::test]
    async fn captures_card_snapshot_from_gateway() {
        let store = Arc::new(MockSubscriptionStore::new());
        let gateway =
            Arc::new(MockPaymentGateway::new().with_payment_methods(vec![visa()]));
        let handler = CreateSubscriptionHandler::new(store, gateway.clone());

        let result = handler.handle(command(AccountId::new())).await.unwrap();

        let snapshot = result.payment_method_snapshot.unwrap();
        assert_eq!(snapshot.brand, "visa");
        assert_eq!(snapshot.last4, "4242");
        assert!(gateway.calls().contains(&"list_payment_methods".to_string()));
    }

    #[tokio::test]
    async fn resets_canceled_row_to_fresh_lifecycle() {
        let account_id = AccountId::new();
        let mut old = Subscription::create(
            SubscriptionId::new(),
            account_id,
            "cus_mock_1".to_string(),
            "price_basic_monthly".to_string(),
            None,
        )
        .unwrap();
        old.activate(Timestamp::now(), Timestamp::now().add_days(30), Some("sub_old".to_string()))
            .unwrap();
        old.cancel_now(None).unwrap();
        old.version = 7;
        let old_id = old.id;

        let store = Arc::new(MockSubscriptionStore::with_subscription(old));
        let gateway = Arc::new(MockPaymentGateway::new());
        let handler = CreateSubscriptionHandler::new(store.clone(), gateway);

        let result = handler.handle(command(account_id)).await.unwrap();

        // Same row identity, fresh lifecycle
        assert_eq!(result.id, old_id);
        assert_eq!(result.status, SubscriptionStatus::Incomplete);
        assert!(result.canceled_at.is_none());
        assert!(!result.cancel_at_period_end);
        assert_eq!(result.provider_subscription_id, Some("sub_mock_1".to_string()));
        assert_eq!(store.stored().len(), 1);
        assert_eq!(store.stored()[0].version, 8);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failure Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn rejects_when_account_has_live_subscription() {
        let account_id = AccountId::new();
        let mut sub = Subscription::create(
            SubscriptionId::new(),
            account_id,
            "cus_mock_1".to_string(),
            "price_basic_monthly".to_string(),
            None,
        )
        .unwrap();
        sub.activate(Timestamp::now(), Timestamp::now().add_days(30), Some("sub_live".to_string()))
            .unwrap();

        let store = Arc::new(MockSubscriptionStore::with_subscription(sub));
        let gateway = Arc::new(MockPaymentGateway::new());
        let handler = CreateSubscriptionHandler::new(store, gateway.clone());

        let result = handler.handle(command(account_id)).await;

        assert!(matches!(result, Err(SubscriptionError::AlreadyActive)));
        // Gateway must not be touched for a rejected command
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn surfaces_gateway_rejection() {
        let store = Arc::new(MockSubscriptionStore::new());
        let gateway = Arc::new(MockPaymentGateway::rejecting());
        let handler = CreateSubscriptionHandler::new(store.clone(), gateway);

        let result = handler.handle(command(AccountId::new())).await;

        assert!(matches!(result, Err(SubscriptionError::RemoteRejected(_))));
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn surfaces_gateway_outage_as_unavailable() {
        let store = Arc::new(MockSubscriptionStore::new());
        let gateway = Arc::new(MockPaymentGateway::unavailable());
        let handler = CreateSubscriptionHandler::new(store.clone(), gateway);

        let result = handler.handle(command(AccountId::new())).await;

        assert!(matches!(result, Err(SubscriptionError::RemoteUnavailable(_))));
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_price_reference() {
        let store = Arc::new(MockSubscriptionStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let handler = CreateSubscriptionHandler::new(store, gateway);

        let mut cmd = command(AccountId::new());
        cmd.price_reference = String::new();

        let result = handler.handle(cmd).await;

        assert!(matches!(result, Err(SubscriptionError::Validation(_))));
    }
}
