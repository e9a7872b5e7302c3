//! Errors for subscription commands.
//!
//! These are the failures the command handlers (create, cancel,
//! reactivate) surface to callers. Webhook processing has its own
//! error type in [`super::webhook_errors`].

use thiserror::Error;

/// Failure modes for subscription command handling.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Subscription not found")]
    NotFound,

    #[error("Subscription is in a terminal state: {0}")]
    TerminalState(String),

    #[error("Account already has a live subscription")]
    AlreadyActive,

    #[error("Payment provider rejected the request: {0}")]
    RemoteRejected(String),

    #[error("Payment provider is unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Concurrent update conflict, retries exhausted")]
    Conflict,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl SubscriptionError {
    /// True for failures worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubscriptionError::RemoteUnavailable(_) | SubscriptionError::Conflict
        )
    }
}

impl From<crate::domain::foundation::DomainError> for SubscriptionError {
    fn from(err: crate::domain::foundation::DomainError) -> Self {
        use crate::domain::foundation::ErrorCode;
        match err.code {
            ErrorCode::SubscriptionNotFound => SubscriptionError::NotFound,
            ErrorCode::ValidationFailed | ErrorCode::EmptyField | ErrorCode::InvalidFormat => {
                SubscriptionError::Validation(err.message)
            }
            ErrorCode::InvalidStateTransition | ErrorCode::TerminalState => {
                SubscriptionError::TerminalState(err.message)
            }
            _ => SubscriptionError::Storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SubscriptionError::RemoteUnavailable("timeout".to_string()).is_retryable());
        assert!(SubscriptionError::Conflict.is_retryable());

        assert!(!SubscriptionError::NotFound.is_retryable());
        assert!(!SubscriptionError::RemoteRejected("card declined".to_string()).is_retryable());
        assert!(!SubscriptionError::TerminalState("unpaid".to_string()).is_retryable());
    }

    #[test]
    fn state_transition_failures_are_not_storage_errors() {
        use crate::domain::foundation::{DomainError, ErrorCode};

        let err = DomainError::new(
            ErrorCode::InvalidStateTransition,
            "Cannot schedule cancellation from status Incomplete",
        );
        assert!(matches!(
            SubscriptionError::from(err),
            SubscriptionError::TerminalState(_)
        ));

        let err = DomainError::new(ErrorCode::TerminalState, "Subscription already ended");
        assert!(matches!(
            SubscriptionError::from(err),
            SubscriptionError::TerminalState(_)
        ));
    }

    #[test]
    fn display_messages_are_descriptive() {
        let err = SubscriptionError::TerminalState("canceled".to_string());
        assert_eq!(
            format!("{}", err),
            "Subscription is in a terminal state: canceled"
        );
    }
}
