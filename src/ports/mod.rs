//! Port traits for the hexagonal architecture.
//!
//! Ports define the contracts between the application core and the
//! outside world. Adapters implement these traits for concrete
//! infrastructure (Postgres, the billing provider's API, in-memory
//! fakes for tests).

mod notification_emitter;
mod payment_gateway;
mod processed_event_store;
mod subscription_store;

pub use notification_emitter::{Notification, NotificationEmitter, NotificationKind};
pub use payment_gateway::{
    GatewayError, GatewaySubscription, PaymentGateway, PaymentMethodSummary,
};
pub use processed_event_store::{ProcessedEventRecord, ProcessedEventStore, SaveResult};
pub use subscription_store::{CasOutcome, SubscriptionStore};
