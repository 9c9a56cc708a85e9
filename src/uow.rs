use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use crate::error::PersistenceError;
use crate::handler::ReactionHandler;
use crate::{Aggregate, OutboxMessage};

/// The pending local write set of a unit of work against a durable store.
///
/// Everything written through a session stays invisible until [`Session::commit`] succeeds, and is
/// discarded if the session is dropped without committing.
#[async_trait]
pub trait Session: Send {
    /// Adds an outbox message to the pending write set.
    async fn stage(&mut self, message: OutboxMessage) -> Result<(), PersistenceError>;

    /// Atomically persists the whole pending write set, returning the number of persisted
    /// records. Either everything is persisted or nothing is.
    async fn commit(self) -> Result<u64, PersistenceError>;
}

type BoxedReactionHandler<E, S> = Box<dyn ReactionHandler<E, S> + Send + Sync>;

/// The ordered set of [`ReactionHandler`]s run on every domain event at commit time. Build it once
/// at startup and share it (it is wrapped in an [`Arc`] by [`UnitOfWork::new`]) among all the
/// units of work of a module.
pub struct ReactionHandlers<E, S> {
    handlers: Vec<BoxedReactionHandler<E, S>>,
}

impl<E, S> Default for ReactionHandlers<E, S> {
    fn default() -> Self {
        Self { handlers: vec![] }
    }
}

impl<E, S> ReactionHandlers<E, S>
where
    S: Session,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Set reaction handlers list
    pub fn with_handlers(mut self, handlers: Vec<BoxedReactionHandler<E, S>>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Add a single reaction handler
    pub fn add_handler(mut self, handler: impl ReactionHandler<E, S> + Send + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &BoxedReactionHandler<E, S>> {
        self.handlers.iter()
    }
}

/// The commit coordinator of a single business operation.
///
/// Business code performs its own writes through [`UnitOfWork::session_mut`], raises domain events
/// on its aggregates and finally calls [`UnitOfWork::commit`]. The commit translates the events into
/// outbox messages and persists them together with the business writes, in one atomic write: an
/// integration event is recorded if and only if the state change that caused it is.
pub struct UnitOfWork<E, S> {
    session: S,
    handlers: Arc<ReactionHandlers<E, S>>,
}

impl<E, S> UnitOfWork<E, S>
where
    E: Sync,
    S: Session,
{
    /// Creates a new unit of work over a freshly opened session.
    pub fn new(session: S, handlers: impl Into<Arc<ReactionHandlers<E, S>>>) -> Self {
        Self {
            session,
            handlers: handlers.into(),
        }
    }

    /// The session business code writes its own mutations through.
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Commits the unit of work.
    ///
    /// The domain events queued on the given aggregates are dispatched, aggregate by aggregate and
    /// in the order they were raised, to every reaction handler. Then the session is committed.
    /// On success the event queues are drained and the number of persisted records returned.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing handler, or the error of the atomic write. In both
    /// cases nothing is persisted and no event queue is touched: the caller should retry the whole
    /// business operation.
    #[tracing::instrument(skip_all, fields(aggregates = aggregates.len()), err)]
    pub async fn commit(mut self, aggregates: &mut [&mut dyn Aggregate<Event = E>]) -> Result<u64, PersistenceError> {
        for aggregate in aggregates.iter() {
            for event in aggregate.event_queue().iter() {
                for handler in self.handlers.iter() {
                    let span = tracing::trace_span!(
                        "txoutbox.reaction_handler",
                        aggregate = aggregate.name(),
                        reaction_handler = handler.name()
                    );

                    if let Err(error) = handler.handle(event, &mut self.session).instrument(span).await {
                        tracing::error!({
                            aggregate = aggregate.name(),
                            reaction_handler = handler.name(),
                            error = ?error,
                        }, "reaction handler failed to handle event");

                        return Err(error);
                    }
                }
            }
        }

        let count: u64 = self.session.commit().await?;

        for aggregate in aggregates.iter_mut() {
            let _ = aggregate.event_queue_mut().drain();
        }

        metrics::counter!("txoutbox.uow.committed").increment(1);
        tracing::debug!(records = count, "unit of work committed");

        Ok(count)
    }
}
