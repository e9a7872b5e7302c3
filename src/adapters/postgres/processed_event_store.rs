//! PostgreSQL implementation of ProcessedEventStore.
//!
//! The unique constraint on provider_event_id is the idempotency gate:
//! `ON CONFLICT DO NOTHING` with zero rows affected means another
//! delivery of the same event already claimed it.

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{ProcessedEventRecord, ProcessedEventStore, SaveResult};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of the ProcessedEventStore port.
pub struct PostgresProcessedEventStore {
    pool: PgPool,
}

impl PostgresProcessedEventStore {
    /// Creates a new PostgresProcessedEventStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedEventStore for PostgresProcessedEventStore {
    async fn save(&self, record: &ProcessedEventRecord) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (id, provider_event_id, event_type, processed_at, payload)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (provider_event_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(record.processed_at.as_datetime())
        .bind(&record.payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to record processed event: {}", e),
            )
        })?;

        if result.rows_affected() == 0 {
            Ok(SaveResult::AlreadyExists)
        } else {
            Ok(SaveResult::Inserted)
        }
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM processed_events WHERE processed_at < $1")
            .bind(cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Failed to prune processed events: {}", e),
                )
            })?;

        Ok(result.rows_affected())
    }
}
