use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::Instrument;

use crate::bus::{BusError, EventBus, Subscriber};
use crate::event::Envelope;

type SharedSubscriber<T> = Arc<dyn Subscriber<T> + Send + Sync>;

/// An [`EventBus`] delivering envelopes to subscribers living in the same process.
///
/// Every subscriber receives every envelope, in registration order, even when an earlier one fails.
/// The publish fails with the first subscriber error, so the relay delivers the envelope again
/// later: subscribers which already handled it will see it twice.
pub struct InProcessEventBus<T> {
    subscribers: RwLock<Vec<SharedSubscriber<T>>>,
}

impl<T> Default for InProcessEventBus<T> {
    fn default() -> Self {
        Self {
            subscribers: RwLock::new(vec![]),
        }
    }
}

impl<T> InProcessEventBus<T>
where
    T: Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single subscriber while building the bus.
    pub fn with_subscriber(mut self, subscriber: impl Subscriber<T> + Send + 'static) -> Self {
        self.subscribers.get_mut().push(Arc::new(subscriber));
        self
    }

    /// Safely add a subscriber to a bus which may be already in use. Since it appends a subscriber
    /// to a [`RwLock`] this function needs to be `async`.
    ///
    /// Subscribers added while an envelope is being published only receive the next envelopes.
    pub async fn add_subscriber(&self, subscriber: impl Subscriber<T> + Send + 'static) {
        let mut guard = self.subscribers.write().await;

        guard.push(Arc::new(subscriber))
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[async_trait]
impl<T> EventBus<T> for InProcessEventBus<T>
where
    T: Send + Sync,
{
    async fn publish(&self, envelope: &Envelope<T>) -> Result<(), BusError> {
        // The lock is released before dispatching, so subscribers may add subscribers.
        let subscribers: Vec<SharedSubscriber<T>> = self.subscribers.read().await.clone();
        let mut first_error: Option<BusError> = None;

        for subscriber in subscribers.iter() {
            let span = tracing::trace_span!(
                "txoutbox.subscriber",
                event_id = %envelope.id,
                event_type = envelope.event_type.as_str(),
                subscriber = subscriber.name()
            );

            if let Err(error) = subscriber.handle(envelope).instrument(span).await {
                tracing::warn!({
                    event_id = %envelope.id,
                    event_type = envelope.event_type.as_str(),
                    subscriber = subscriber.name(),
                    error = %error,
                }, "subscriber failed to handle event");

                if first_error.is_none() {
                    first_error = Some(BusError::Subscriber {
                        subscriber: subscriber.name(),
                        source: error,
                    });
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
