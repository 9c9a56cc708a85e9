use std::marker::PhantomData;
use std::ops::Deref;

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::event::IntegrationEvent;
use crate::uow::Session;
use crate::OutboxMessage;

/// This trait is used to implement a `ReactionHandler`. A reaction handler translates the domain
/// events raised during an operation into rows of the pending write set of the [`Session`],
/// typically outbox messages.
///
/// No side effects must be performed inside of this kind of handler: no network calls and no
/// publishing. Everything it produces stays in the session and becomes visible only if the whole
/// unit of work commits.
#[async_trait]
pub trait ReactionHandler<E, S>: Sync
where
    S: Session,
{
    /// Handle an event staging rows in the session. If an error is returned the unit of work is
    /// aborted and its commit returns that error.
    async fn handle(&self, event: &E, session: &mut S) -> Result<(), PersistenceError>;

    /// The name of the reaction handler. By default, this is the type name of the handler, but it
    /// can be overridden to provide a custom name. This name is used as part of tracing spans, to
    /// identify the handler being run.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
impl<E, S, Q, T> ReactionHandler<E, S> for T
where
    E: Sync,
    S: Session,
    Q: ReactionHandler<E, S> + ?Sized,
    T: Deref<Target = Q> + Send + Sync,
{
    /// Deref call to [`ReactionHandler::handle`].
    async fn handle(&self, event: &E, session: &mut S) -> Result<(), PersistenceError> {
        self.deref().handle(event, session).await
    }

    /// Deref call to [`ReactionHandler::name`].
    fn name(&self) -> &'static str {
        self.deref().name()
    }
}

/// A [`ReactionHandler`] staging an outbox message for every domain event that maps to the
/// integration event `I`.
///
/// ```rust
/// # use serde::{Deserialize, Serialize};
/// # use txoutbox::store::InMemorySession;
/// use txoutbox::{IntegrationEvent, IntegrationEventHandler, ReactionHandlers};
///
/// pub enum EmployeeEvent {
///     Hired { id: u64 },
///     Renamed { id: u64, name: String },
/// }
///
/// #[derive(Serialize, Deserialize)]
/// pub struct EmployeeHired {
///     pub id: u64,
/// }
///
/// impl IntegrationEvent for EmployeeHired {
///     const EVENT_TYPE: &'static str = "employees.hired";
/// }
///
/// let handlers: ReactionHandlers<EmployeeEvent, InMemorySession> = ReactionHandlers::new()
///     .add_handler(IntegrationEventHandler::new(|event: &EmployeeEvent| match event {
///         EmployeeEvent::Hired { id } => Some(EmployeeHired { id: *id }),
///         _ => None,
///     }));
///
/// assert_eq!(handlers.len(), 1);
/// ```
pub struct IntegrationEventHandler<E, I, F> {
    translate: F,
    _phantom: PhantomData<fn(&E) -> I>,
}

impl<E, I, F> IntegrationEventHandler<E, I, F>
where
    I: IntegrationEvent,
    F: Fn(&E) -> Option<I> + Send + Sync,
{
    pub fn new(translate: F) -> Self {
        Self {
            translate,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<E, I, F, S> ReactionHandler<E, S> for IntegrationEventHandler<E, I, F>
where
    E: Sync,
    I: IntegrationEvent,
    F: Fn(&E) -> Option<I> + Send + Sync,
    S: Session,
{
    async fn handle(&self, event: &E, session: &mut S) -> Result<(), PersistenceError> {
        match (self.translate)(event) {
            Some(integration_event) => session.stage(OutboxMessage::from_event(&integration_event)?).await,
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        I::EVENT_TYPE
    }
}
