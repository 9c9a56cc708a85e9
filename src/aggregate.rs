/// Append-only buffer of the domain events raised by an [`Aggregate`] during a single operation.
///
/// Business logic can only [`append`](EventQueue::append) to it: reading and draining the queue is
/// reserved to the [`crate::UnitOfWork`], which drains it once the events have been durably
/// translated into outbox messages.
#[derive(Debug, Clone)]
pub struct EventQueue<E> {
    events: Vec<E>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self { events: vec![] }
    }
}

impl<E> EventQueue<E> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a domain event. No side effect other than the local state change.
    pub fn append(&mut self, event: E) {
        self.events.push(event);
    }

    /// Number of events waiting to be committed.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &E> {
        self.events.iter()
    }

    /// Returns all the queued events in the order they were raised, leaving the queue empty.
    pub(crate) fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }
}

/// A consistency boundary whose state changes are persisted atomically together with the outbox
/// messages derived from its domain events.
///
/// The aggregate owns its [`EventQueue`] exclusively; the accessors below hand it over to the
/// [`crate::UnitOfWork`] at commit time.
///
/// ```rust
/// use txoutbox::{Aggregate, EventQueue};
///
/// pub enum EmployeeEvent {
///     Hired { name: String },
/// }
///
/// #[derive(Default)]
/// pub struct Employee {
///     name: String,
///     events: EventQueue<EmployeeEvent>,
/// }
///
/// impl Employee {
///     pub fn hire(name: &str) -> Self {
///         let mut employee = Self { name: name.to_string(), ..Default::default() };
///         employee.raise(EmployeeEvent::Hired { name: name.to_string() });
///         employee
///     }
/// }
///
/// impl Aggregate for Employee {
///     type Event = EmployeeEvent;
///
///     fn event_queue(&self) -> &EventQueue<EmployeeEvent> {
///         &self.events
///     }
///
///     fn event_queue_mut(&mut self) -> &mut EventQueue<EmployeeEvent> {
///         &mut self.events
///     }
/// }
///
/// assert_eq!(Employee::hire("Ada").event_queue().len(), 1);
/// ```
pub trait Aggregate: Send + Sync {
    type Event;

    fn event_queue(&self) -> &EventQueue<Self::Event>;

    fn event_queue_mut(&mut self) -> &mut EventQueue<Self::Event>;

    /// The name of the aggregate. By default, this is the type name of the aggregate, but it can be
    /// overridden to provide a custom name. This name is used as part of tracing spans.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Raises a domain event, queueing it until the next commit.
    fn raise(&mut self, event: Self::Event)
    where
        Self: Sized,
    {
        self.event_queue_mut().append(event);
    }
}
