//! Dead-letter store for ingest events that could not be applied.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use ecomm_core::FailedEventId;

use super::{RepositoryError, to_u32};
use crate::models::failed_event::FailedEvent;

macro_rules! failed_event_columns {
    () => {
        "event_id, topic, event_data, error_message, retry_count, created_at, last_retry_at"
    };
}

#[derive(Debug, sqlx::FromRow)]
struct FailedEventRow {
    event_id: Uuid,
    topic: String,
    event_data: Json<Value>,
    error_message: String,
    retry_count: i32,
    created_at: DateTime<Utc>,
    last_retry_at: Option<DateTime<Utc>>,
}

impl TryFrom<FailedEventRow> for FailedEvent {
    type Error = RepositoryError;

    fn try_from(row: FailedEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: FailedEventId::new(row.event_id),
            topic: row.topic,
            event_data: row.event_data.0,
            error_message: row.error_message,
            retry_count: to_u32("retry_count", row.retry_count)?,
            created_at: row.created_at,
            last_retry_at: row.last_retry_at,
        })
    }
}

/// Repository for `failed_events`.
pub struct FailedEventRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> FailedEventRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store an event that failed to decode or write.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record(
        &self,
        topic: &str,
        event_data: &Value,
        error_message: &str,
    ) -> Result<FailedEvent, RepositoryError> {
        let row = sqlx::query_as::<_, FailedEventRow>(concat!(
            "INSERT INTO failed_events (topic, event_data, error_message) \
             VALUES ($1, $2, $3) \
             RETURNING ",
            failed_event_columns!()
        ))
        .bind(topic)
        .bind(Json(event_data))
        .bind(error_message)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "failed event"))?;

        FailedEvent::try_from(row)
    }

    /// Dead letters, oldest first, optionally for one topic.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        topic: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FailedEvent>, RepositoryError> {
        let rows = sqlx::query_as::<_, FailedEventRow>(concat!(
            "SELECT ",
            failed_event_columns!(),
            " FROM failed_events \
              WHERE ($1::text IS NULL OR topic = $1) \
              ORDER BY created_at, event_id \
              LIMIT $2"
        ))
        .bind(topic)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(FailedEvent::try_from).collect()
    }

    /// Count a failed retry attempt and keep its error.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the event doesn't exist.
    pub async fn mark_retry(
        &self,
        id: FailedEventId,
        error_message: &str,
    ) -> Result<FailedEvent, RepositoryError> {
        let row = sqlx::query_as::<_, FailedEventRow>(concat!(
            "UPDATE failed_events \
             SET retry_count = retry_count + 1, last_retry_at = now(), error_message = $2 \
             WHERE event_id = $1 \
             RETURNING ",
            failed_event_columns!()
        ))
        .bind(id.as_uuid())
        .bind(error_message)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "failed event"))?
        .ok_or(RepositoryError::NotFound)?;

        FailedEvent::try_from(row)
    }

    /// Drop an event once it has been applied.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the event doesn't exist.
    pub async fn delete(&self, id: FailedEventId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM failed_events WHERE event_id = $1")
            .bind(id.as_uuid())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
