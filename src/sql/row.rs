use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::OutboxMessage;

/// Outbox message representation on the outbox table
#[derive(sqlx::FromRow, Debug)]
pub struct DbOutboxMessage {
    pub id: Uuid,
    pub event_type: String,
    pub content: String,
    pub occurred_on: DateTime<Utc>,
    pub processed_on: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub attempt_count: i32,
}

impl From<DbOutboxMessage> for OutboxMessage {
    fn from(row: DbOutboxMessage) -> Self {
        Self {
            id: row.id,
            event_type: row.event_type,
            content: row.content,
            occurred_on: row.occurred_on,
            processed_on: row.processed_on,
            error: row.error,
            // The table checks attempt_count >= 0.
            attempt_count: u32::try_from(row.attempt_count).unwrap_or_default(),
        }
    }
}

/// Postgres has no unsigned integers: attempt counts are stored as `INTEGER`, saturating.
pub(crate) fn db_attempts(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

/// Batch sizes and limits are bound as `BIGINT`, saturating.
pub(crate) fn db_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
