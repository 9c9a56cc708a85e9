use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::store::OutboxStore;
use crate::uow::Session;
use crate::OutboxMessage;

/// A business record kept by the [`InMemoryStore`], versioned for optimistic concurrency.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub value: Value,
    pub version: i64,
}

/// Store operations whose next execution can be made to fail, see [`InMemoryStore::fail_next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Commit,
    FetchPending,
    RecordOutcomes,
}

#[derive(Default)]
struct Tables {
    messages: HashMap<Uuid, OutboxMessage>,
    documents: HashMap<(String, String), Document>,
    faults: HashMap<StoreOperation, String>,
}

impl Tables {
    fn fault(&mut self, operation: StoreOperation) -> Result<(), PersistenceError> {
        match self.faults.remove(&operation) {
            Some(reason) => Err(PersistenceError::Unavailable(reason)),
            None => Ok(()),
        }
    }
}

/// Durable-store stand-in keeping business documents and outbox messages in memory.
///
/// Its sessions apply their whole write set under a single lock, so commits are atomic the same
/// way a database transaction is. The handle is cheap to clone; clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new session, i.e. an empty pending write set.
    pub fn begin(&self) -> InMemorySession {
        InMemorySession {
            store: self.clone(),
            messages: vec![],
            writes: vec![],
        }
    }

    /// Makes the next execution of `operation` fail with [`PersistenceError::Unavailable`], as if
    /// the connection to the store was lost.
    pub fn fail_next(&self, operation: StoreOperation, reason: impl Into<String>) {
        let _ = self.tables().faults.insert(operation, reason.into());
    }

    /// All the outbox messages, oldest first.
    pub fn messages(&self) -> Vec<OutboxMessage> {
        let mut messages: Vec<OutboxMessage> = self.tables().messages.values().cloned().collect();
        messages.sort_by(|a, b| (a.occurred_on, a.id).cmp(&(b.occurred_on, b.id)));
        messages
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.tables()
            .documents
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.tables()
            .documents
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|(_, document)| document.clone())
            .collect()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, messages: Vec<OutboxMessage>, writes: Vec<DocumentWrite>) -> Result<u64, PersistenceError> {
        let mut tables = self.tables();
        tables.fault(StoreOperation::Commit)?;

        let mut staged_ids: HashSet<Uuid> = HashSet::new();
        for message in &messages {
            if tables.messages.contains_key(&message.id) || !staged_ids.insert(message.id) {
                return Err(PersistenceError::Constraint(format!(
                    "duplicate outbox message id {}",
                    message.id
                )));
            }
        }

        // Validate every write against the committed state plus the writes before it, then apply
        // them all at once.
        let mut pending: HashMap<(String, String), Document> = HashMap::new();
        let count: u64 = (writes.len() + messages.len()) as u64;

        for write in writes {
            let key = write.key();
            let current: Option<&Document> = pending.get(&key).or_else(|| tables.documents.get(&key));

            let document = match (write, current) {
                (DocumentWrite::Insert { .. }, Some(_)) => {
                    return Err(PersistenceError::Constraint(format!("duplicate document {}/{}", key.0, key.1)));
                }
                (DocumentWrite::Insert { value, .. }, None) => Document { value, version: 1 },
                (DocumentWrite::Update { expected_version, .. }, None) => {
                    return Err(PersistenceError::Conflict {
                        entity: format!("{}/{}", key.0, key.1),
                        expected: expected_version,
                        actual: 0,
                    });
                }
                (DocumentWrite::Update { expected_version, .. }, Some(document))
                    if document.version != expected_version =>
                {
                    return Err(PersistenceError::Conflict {
                        entity: format!("{}/{}", key.0, key.1),
                        expected: expected_version,
                        actual: document.version,
                    });
                }
                (DocumentWrite::Update { value, .. }, Some(document)) => Document {
                    value,
                    version: document.version + 1,
                },
            };

            let _ = pending.insert(key, document);
        }

        tables.documents.extend(pending);
        tables
            .messages
            .extend(messages.into_iter().map(|message| (message.id, message)));

        Ok(count)
    }
}

enum DocumentWrite {
    Insert {
        collection: String,
        id: String,
        value: Value,
    },
    Update {
        collection: String,
        id: String,
        value: Value,
        expected_version: i64,
    },
}

impl DocumentWrite {
    fn key(&self) -> (String, String) {
        match self {
            Self::Insert { collection, id, .. } | Self::Update { collection, id, .. } => (collection.clone(), id.clone()),
        }
    }
}

/// The pending write set of an [`InMemoryStore`]. Nothing is visible in the store until
/// [`Session::commit`].
pub struct InMemorySession {
    store: InMemoryStore,
    messages: Vec<OutboxMessage>,
    writes: Vec<DocumentWrite>,
}

impl InMemorySession {
    /// Inserts a new document. Committing fails if the document already exists.
    pub fn insert(
        &mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        value: impl Serialize,
    ) -> Result<(), PersistenceError> {
        self.writes.push(DocumentWrite::Insert {
            collection: collection.into(),
            id: id.into(),
            value: serde_json::to_value(value)?,
        });
        Ok(())
    }

    /// Replaces a document. Committing fails with [`PersistenceError::Conflict`] if its version is
    /// not `expected_version` anymore.
    pub fn update(
        &mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        value: impl Serialize,
        expected_version: i64,
    ) -> Result<(), PersistenceError> {
        self.writes.push(DocumentWrite::Update {
            collection: collection.into(),
            id: id.into(),
            value: serde_json::to_value(value)?,
            expected_version,
        });
        Ok(())
    }

    /// Outbox messages staged so far.
    pub fn staged(&self) -> &[OutboxMessage] {
        &self.messages
    }
}

#[async_trait]
impl Session for InMemorySession {
    async fn stage(&mut self, message: OutboxMessage) -> Result<(), PersistenceError> {
        self.messages.push(message);
        Ok(())
    }

    async fn commit(self) -> Result<u64, PersistenceError> {
        self.store.apply(self.messages, self.writes)
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn fetch_pending(&self, batch_size: usize, max_attempts: u32) -> Result<Vec<OutboxMessage>, PersistenceError> {
        self.tables().fault(StoreOperation::FetchPending)?;

        Ok(self
            .messages()
            .into_iter()
            .filter(|message| message.is_eligible(max_attempts))
            .take(batch_size)
            .collect())
    }

    async fn record_outcomes(&self, messages: &[OutboxMessage]) -> Result<u64, PersistenceError> {
        let mut tables = self.tables();
        tables.fault(StoreOperation::RecordOutcomes)?;

        let mut updated: u64 = 0;
        for message in messages {
            if let Some(stored) = tables.messages.get_mut(&message.id) {
                if stored.processed_on.is_none() {
                    stored.processed_on = message.processed_on;
                    stored.error = message.error.clone();
                    stored.attempt_count = message.attempt_count;
                    updated += 1;
                }
            }
        }

        Ok(updated)
    }

    async fn find(&self, id: Uuid) -> Result<Option<OutboxMessage>, PersistenceError> {
        Ok(self.tables().messages.get(&id).cloned())
    }

    async fn dead_letters(&self, max_attempts: u32, limit: usize) -> Result<Vec<OutboxMessage>, PersistenceError> {
        Ok(self
            .messages()
            .into_iter()
            .filter(|message| message.processed_on.is_none() && message.attempt_count >= max_attempts)
            .take(limit)
            .collect())
    }

    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PersistenceError> {
        let mut tables = self.tables();
        let before: usize = tables.messages.len();

        tables
            .messages
            .retain(|_, message| !matches!(message.processed_on, Some(processed_on) if processed_on < cutoff));

        Ok((before - tables.messages.len()) as u64)
    }
}
