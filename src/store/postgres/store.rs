use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use sqlx::{Pool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::sql::row::{db_attempts, db_limit, DbOutboxMessage};
use crate::sql::statements::Statements;
use crate::store::OutboxStore;
use crate::OutboxMessage;

use super::PgSession;

/// Default Postgres implementation of the [`OutboxStore`], and the entry point to open
/// [`PgSession`]s writing in the same database.
///
/// The store is protected by an [`Arc`] that allows it to be cloneable still having the same memory
/// reference.
#[derive(Clone)]
pub struct PgOutboxStore {
    pub(super) inner: Arc<InnerPgOutboxStore>,
}

pub(super) struct InnerPgOutboxStore {
    pub(super) pool: Pool<Postgres>,
    pub(super) statements: Statements,
}

impl PgOutboxStore {
    /// Returns the name of the outbox table
    pub fn table_name(&self) -> &str {
        self.inner.statements.table_name()
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.inner.pool
    }

    /// Opens a new [`PgSession`], beginning a transaction.
    pub async fn begin(&self) -> Result<PgSession, PersistenceError> {
        let transaction: Transaction<'static, Postgres> = self.inner.pool.begin().await?;
        Ok(PgSession::new(self.clone(), transaction))
    }

    /// This function returns a stream of every dead-lettered message, oldest first. Mostly useful
    /// for operator tooling.
    pub fn stream_dead_letters(&self, max_attempts: u32) -> BoxStream<'_, Result<OutboxMessage, PersistenceError>> {
        Box::pin({
            sqlx::query_as::<_, DbOutboxMessage>(self.inner.statements.select_dead_letters())
                .bind(db_attempts(max_attempts))
                // LIMIT NULL means no limit
                .bind(Option::<i64>::None)
                .fetch(&self.inner.pool)
                .map(|res: Result<DbOutboxMessage, sqlx::Error>| -> Result<OutboxMessage, PersistenceError> {
                    Ok(res?.into())
                })
        })
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    #[tracing::instrument(skip_all, err)]
    async fn fetch_pending(&self, batch_size: usize, max_attempts: u32) -> Result<Vec<OutboxMessage>, PersistenceError> {
        Ok(sqlx::query_as::<_, DbOutboxMessage>(self.inner.statements.select_pending())
            .bind(db_attempts(max_attempts))
            .bind(db_limit(batch_size))
            .fetch_all(&self.inner.pool)
            .await?
            .into_iter()
            .map(OutboxMessage::from)
            .collect())
    }

    #[tracing::instrument(skip_all, fields(messages = messages.len()), err)]
    async fn record_outcomes(&self, messages: &[OutboxMessage]) -> Result<u64, PersistenceError> {
        if messages.is_empty() {
            return Ok(0);
        }

        let mut ids: Vec<Uuid> = Vec::with_capacity(messages.len());
        let mut processed_on: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(messages.len());
        let mut errors: Vec<Option<String>> = Vec::with_capacity(messages.len());
        let mut attempt_counts: Vec<i32> = Vec::with_capacity(messages.len());

        for message in messages {
            ids.push(message.id);
            processed_on.push(message.processed_on);
            errors.push(message.error.clone());
            attempt_counts.push(db_attempts(message.attempt_count));
        }

        // A single statement: the whole batch is written in one round trip, or not at all.
        let updated: u64 = sqlx::query(self.inner.statements.update_outcome())
            .bind(ids)
            .bind(processed_on)
            .bind(errors)
            .bind(attempt_counts)
            .execute(&self.inner.pool)
            .await?
            .rows_affected();

        Ok(updated)
    }

    async fn find(&self, id: Uuid) -> Result<Option<OutboxMessage>, PersistenceError> {
        Ok(sqlx::query_as::<_, DbOutboxMessage>(self.inner.statements.select_by_id())
            .bind(id)
            .fetch_optional(&self.inner.pool)
            .await?
            .map(OutboxMessage::from))
    }

    async fn dead_letters(&self, max_attempts: u32, limit: usize) -> Result<Vec<OutboxMessage>, PersistenceError> {
        Ok(sqlx::query_as::<_, DbOutboxMessage>(self.inner.statements.select_dead_letters())
            .bind(db_attempts(max_attempts))
            .bind(Some(db_limit(limit)))
            .fetch_all(&self.inner.pool)
            .await?
            .into_iter()
            .map(OutboxMessage::from)
            .collect())
    }

    #[tracing::instrument(skip_all, fields(cutoff = %cutoff), err)]
    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PersistenceError> {
        Ok(sqlx::query(self.inner.statements.delete_processed_before())
            .bind(cutoff)
            .execute(&self.inner.pool)
            .await?
            .rows_affected())
    }
}

/// Debug implementation for [`PgOutboxStore`]. It just shows the statements, that are the only thing
/// that might be useful to debug.
impl std::fmt::Debug for PgOutboxStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgOutboxStore")
            .field("statements", &self.inner.statements)
            .finish()
    }
}
