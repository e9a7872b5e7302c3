//! PostgreSQL implementation of NotificationEmitter.
//!
//! Writes notifications to an outbox-style table that downstream
//! delivery (email, in-app) reads from. Emission is fire-and-forget
//! from the handlers' point of view; a failed insert is logged by the
//! caller and never fails the command that produced it.

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{Notification, NotificationEmitter};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of the NotificationEmitter port.
pub struct PostgresNotificationEmitter {
    pool: PgPool,
}

impl PostgresNotificationEmitter {
    /// Creates a new PostgresNotificationEmitter with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationEmitter for PostgresNotificationEmitter {
    async fn emit(&self, notification: &Notification) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO account_notifications (id, account_id, subscription_id, kind, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.account_id.as_uuid())
        .bind(notification.subscription_id.as_uuid())
        .bind(notification.kind.as_str())
        .bind(notification.occurred_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to emit notification: {}", e),
            )
        })?;

        Ok(())
    }
}
