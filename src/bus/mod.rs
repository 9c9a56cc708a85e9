use std::ops::Deref;

use async_trait::async_trait;

pub use in_process::*;

use crate::error::BoxError;
use crate::event::Envelope;

mod in_process;
#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(feature = "rabbit")]
pub mod rabbit;

/// Error returned by an [`EventBus`] when an envelope could not be published. The relay counts it as
/// a failed delivery attempt.
#[derive(thiserror::Error, Debug)]
pub enum BusError {
    /// A subscriber of an in-process bus failed to handle the envelope.
    #[error("subscriber `{subscriber}` failed: {source}")]
    Subscriber {
        subscriber: &'static str,
        #[source]
        source: BoxError,
    },
    /// The transport (broker connection, serialization, acknowledgement) failed.
    #[error(transparent)]
    Transport(BoxError),
}

/// The responsibility of the [`EventBus`] trait is to publish an integration event on a specific bus
/// implementation.
///
/// Only the [`crate::relay::OutboxRelay`] publishes, never the unit of work: by the time an envelope
/// reaches a bus the state change that produced it is already durable.
#[async_trait]
pub trait EventBus<T>: Sync
where
    T: Sync,
{
    /// Publish an [`Envelope`] on an [`EventBus`] defined by the user.
    ///
    /// Returning an error makes the relay retry the delivery later, so publishing must be safe to
    /// repeat: consumers see every envelope at least once.
    async fn publish(&self, envelope: &Envelope<T>) -> Result<(), BusError>;

    /// The name of the event bus. By default, this is the type name of the event bus, but it can be
    /// overridden to provide a custom name. This name is used as part of tracing spans.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Blanket implementation making an [`EventBus`] every (smart) pointer to an [`EventBus`],
/// e.g. `&Bus`, `Box<Bus>`, `Arc<dyn EventBus<T>>`.
#[async_trait]
impl<T, Q, P> EventBus<T> for P
where
    T: Sync,
    Q: EventBus<T> + ?Sized,
    P: Deref<Target = Q> + Send + Sync,
{
    /// Deref call to [`EventBus::publish`].
    async fn publish(&self, envelope: &Envelope<T>) -> Result<(), BusError> {
        self.deref().publish(envelope).await
    }

    /// Deref call to [`EventBus::name`].
    fn name(&self) -> &'static str {
        self.deref().name()
    }
}

/// A subscriber of an [`InProcessEventBus`]. Subscribers must be idempotent: the same envelope can
/// be delivered more than once.
#[async_trait]
pub trait Subscriber<T>: Sync
where
    T: Sync,
{
    async fn handle(&self, envelope: &Envelope<T>) -> Result<(), BoxError>;

    /// The name of the subscriber, used in errors and tracing spans.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
impl<T, Q, P> Subscriber<T> for P
where
    T: Sync,
    Q: Subscriber<T> + ?Sized,
    P: Deref<Target = Q> + Send + Sync,
{
    /// Deref call to [`Subscriber::handle`].
    async fn handle(&self, envelope: &Envelope<T>) -> Result<(), BoxError> {
        self.deref().handle(envelope).await
    }

    /// Deref call to [`Subscriber::name`].
    fn name(&self) -> &'static str {
        self.deref().name()
    }
}
