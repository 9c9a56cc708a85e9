use std::ops::Deref;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::*;

use crate::error::PersistenceError;
use crate::OutboxMessage;

mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

/// An OutboxStore is the durable table of outbox messages as seen by the relay: it selects the
/// messages due for delivery and records the outcome of their delivery.
///
/// New messages are never created through this trait: they are staged in a [`crate::Session`] by
/// the [`crate::UnitOfWork`].
///
/// A store is meant to be polled by a single relay at a time. Two relays polling the same store may
/// select and publish the same message concurrently: running more than one instance needs a
/// claiming step (a locking read or a claim token) on top of this trait.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns up to `batch_size` messages not yet processed and with fewer than `max_attempts`
    /// failed attempts, oldest first.
    async fn fetch_pending(&self, batch_size: usize, max_attempts: u32) -> Result<Vec<OutboxMessage>, PersistenceError>;

    /// Persists the delivery state of the given messages in a single atomic write, returning the
    /// number of updated rows. Messages already processed in the store are left untouched.
    async fn record_outcomes(&self, messages: &[OutboxMessage]) -> Result<u64, PersistenceError>;

    /// Loads a single message.
    async fn find(&self, id: Uuid) -> Result<Option<OutboxMessage>, PersistenceError>;

    /// Returns up to `limit` messages which exhausted their retry budget without being processed,
    /// oldest first. These need an operator.
    async fn dead_letters(&self, max_attempts: u32, limit: usize) -> Result<Vec<OutboxMessage>, PersistenceError>;

    /// Deletes the messages processed before `cutoff`, returning how many were deleted. Pending and
    /// dead-lettered messages are kept.
    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PersistenceError>;
}

/// Blanket implementation making an [`OutboxStore`] every (smart) pointer to an [`OutboxStore`],
/// e.g. `&Store`, `Box<Store>`, `Arc<Store>`.
#[async_trait]
impl<S, T> OutboxStore for T
where
    S: OutboxStore + ?Sized,
    T: Deref<Target = S> + Send + Sync,
{
    /// Deref call to [`OutboxStore::fetch_pending`].
    async fn fetch_pending(&self, batch_size: usize, max_attempts: u32) -> Result<Vec<OutboxMessage>, PersistenceError> {
        self.deref().fetch_pending(batch_size, max_attempts).await
    }

    /// Deref call to [`OutboxStore::record_outcomes`].
    async fn record_outcomes(&self, messages: &[OutboxMessage]) -> Result<u64, PersistenceError> {
        self.deref().record_outcomes(messages).await
    }

    /// Deref call to [`OutboxStore::find`].
    async fn find(&self, id: Uuid) -> Result<Option<OutboxMessage>, PersistenceError> {
        self.deref().find(id).await
    }

    /// Deref call to [`OutboxStore::dead_letters`].
    async fn dead_letters(&self, max_attempts: u32, limit: usize) -> Result<Vec<OutboxMessage>, PersistenceError> {
        self.deref().dead_letters(max_attempts, limit).await
    }

    /// Deref call to [`OutboxStore::delete_processed_before`].
    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PersistenceError> {
        self.deref().delete_processed_before(cutoff).await
    }
}
