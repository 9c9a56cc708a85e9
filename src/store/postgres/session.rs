use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgConnection, Postgres, Transaction};

use crate::error::PersistenceError;
use crate::sql::row::db_attempts;
use crate::uow::Session;
use crate::OutboxMessage;

use super::PgOutboxStore;

/// A [`Session`] over a Postgres transaction.
///
/// Business writes go through [`PgSession::execute`] (or [`PgSession::connection`]) and outbox
/// messages are inserted in the same transaction: they all become visible at once, on commit.
/// Dropping the session rolls the transaction back.
pub struct PgSession {
    store: PgOutboxStore,
    transaction: Transaction<'static, Postgres>,
    affected: u64,
}

impl PgSession {
    pub(super) fn new(store: PgOutboxStore, transaction: Transaction<'static, Postgres>) -> Self {
        Self {
            store,
            transaction,
            affected: 0,
        }
    }

    /// Executes a business write inside the transaction, returning the affected rows. The rows are
    /// counted in the total returned by the commit.
    pub async fn execute<'q>(&mut self, query: Query<'q, Postgres, PgArguments>) -> Result<u64, PersistenceError> {
        let rows_affected: u64 = query.execute(&mut *self.transaction).await?.rows_affected();
        self.affected += rows_affected;
        Ok(rows_affected)
    }

    /// The connection of the underlying transaction, for reads or writes that should not be
    /// counted.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.transaction
    }
}

#[async_trait]
impl Session for PgSession {
    async fn stage(&mut self, message: OutboxMessage) -> Result<(), PersistenceError> {
        let rows_affected: u64 = sqlx::query(self.store.inner.statements.insert())
            .bind(message.id)
            .bind(message.event_type)
            .bind(message.content)
            .bind(message.occurred_on)
            .bind(message.processed_on)
            .bind(message.error)
            .bind(db_attempts(message.attempt_count))
            .execute(&mut *self.transaction)
            .await?
            .rows_affected();

        self.affected += rows_affected;
        Ok(())
    }

    async fn commit(self) -> Result<u64, PersistenceError> {
        self.transaction.commit().await?;
        tracing::debug!(table = self.store.table_name(), records = self.affected, "outbox session committed");
        Ok(self.affected)
    }
}
