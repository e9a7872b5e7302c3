//! PostgreSQL adapter implementations.

mod notification_emitter;
mod processed_event_store;
mod subscription_store;

pub use notification_emitter::PostgresNotificationEmitter;
pub use processed_event_store::PostgresProcessedEventStore;
pub use subscription_store::PostgresSubscriptionStore;
