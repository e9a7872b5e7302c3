//! Subscription status state machine.
//!
//! Defines all lifecycle states and the transitions the reconciliation
//! engine is allowed to perform. Events that would require an invalid
//! transition are ignored rather than applied, so delivery order never
//! corrupts the stored state.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created at the provider, first payment not yet confirmed.
    Incomplete,

    /// In a trial period, converts to Active when the trial ends.
    Trialing,

    /// Paid and current.
    Active,

    /// A payment failed; the provider is retrying.
    PastDue,

    /// Ended by request. Terminal.
    Canceled,

    /// Ended after payment retries were exhausted. Terminal.
    Unpaid,
}

impl SubscriptionStatus {
    /// Returns true for statuses that count as a live subscription.
    ///
    /// PastDue is included: the provider is still retrying payment and
    /// the subscription has not ended.
    pub fn is_active_family(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }

    /// Maps a provider status string to the local status.
    ///
    /// `incomplete_expired` collapses into `Unpaid`; both mean the
    /// lifecycle ended without a successful payment.
    pub fn from_provider(s: &str) -> Option<Self> {
        match s {
            "incomplete" => Some(SubscriptionStatus::Incomplete),
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "unpaid" | "incomplete_expired" => Some(SubscriptionStatus::Unpaid),
            _ => None,
        }
    }

    /// Database/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From INCOMPLETE
            (Incomplete, Trialing)
                | (Incomplete, Active)
                | (Incomplete, Canceled)
                | (Incomplete, Unpaid)
            // From TRIALING
                | (Trialing, Active)
                | (Trialing, PastDue)
                | (Trialing, Canceled)
                | (Trialing, Unpaid)
            // From ACTIVE
                | (Active, Active) // Renewal
                | (Active, PastDue)
                | (Active, Canceled)
                | (Active, Unpaid)
            // From PAST_DUE
                | (PastDue, Active)
                | (PastDue, Canceled)
                | (PastDue, Unpaid)
            // CANCELED and UNPAID are terminal
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Incomplete => vec![Trialing, Active, Canceled, Unpaid],
            Trialing => vec![Active, PastDue, Canceled, Unpaid],
            Active => vec![Active, PastDue, Canceled, Unpaid],
            PastDue => vec![Active, Canceled, Unpaid],
            Canceled => vec![],
            Unpaid => vec![],
        }
    }
}
