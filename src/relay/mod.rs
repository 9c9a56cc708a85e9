use chrono::Utc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

pub use config::*;

use crate::bus::EventBus;
use crate::error::{PersistenceError, TransitionError};
use crate::event::{Envelope, EventRegistry};
use crate::store::OutboxStore;
use crate::OutboxMessage;

mod config;

/// What a single tick of the relay did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Messages returned by the store.
    pub fetched: usize,
    /// Messages published and marked as processed.
    pub processed: usize,
    /// Messages whose delivery failed and which will be retried.
    pub failed: usize,
    /// Messages which ran out of attempts, or were poisoned, during this tick.
    pub dead_lettered: usize,
    /// Whether a stop signal interrupted the batch before every fetched message was attempted.
    pub interrupted: bool,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.fetched == 0
    }
}

enum Outcome {
    Processed,
    Failed,
    DeadLettered,
}

/// The background worker moving outbox messages from an [`OutboxStore`] to an [`EventBus`].
///
/// Every tick fetches a fresh batch of pending messages, oldest first, decodes them through the
/// [`EventRegistry`] and publishes them one at a time. The outcome of every attempt is written back
/// with a single [`OutboxStore::record_outcomes`] call at the end of the batch. A message is marked
/// as processed only after the bus acknowledged it, so a crash in between means it gets published
/// again: delivery is at least once.
pub struct OutboxRelay<S, B, T> {
    store: S,
    bus: B,
    registry: EventRegistry<T>,
    config: RelayConfig,
}

impl<S, B, T> OutboxRelay<S, B, T>
where
    S: OutboxStore,
    B: EventBus<T>,
    T: Send + Sync,
{
    /// Creates a new relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the given configuration is not valid.
    pub fn new(store: S, bus: B, registry: EventRegistry<T>, config: RelayConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            store,
            bus,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs a single polling cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be fetched, or if the outcomes of the batch cannot be
    /// written. In the latter case every message of the batch stays pending and will be published
    /// again.
    pub async fn tick(&self) -> Result<TickReport, PersistenceError> {
        self.relay_batch(None).await
    }

    /// Runs a single polling cycle which stops early once `true` is sent on `shutdown`.
    ///
    /// The signal is checked before every message: messages not attempted yet stay pending, and
    /// the outcomes of the attempted ones are still recorded. [`TickReport::interrupted`] tells
    /// whether the batch was cut short.
    ///
    /// # Errors
    ///
    /// Same as [`OutboxRelay::tick`].
    pub async fn tick_with_shutdown(&self, shutdown: &watch::Receiver<bool>) -> Result<TickReport, PersistenceError> {
        self.relay_batch(Some(shutdown)).await
    }

    /// Polls the store until `true` is sent on the `shutdown` channel, or its sender is dropped.
    ///
    /// Store failures are logged and the loop keeps going: the next tick starts from a fresh
    /// fetch. The stop signal is honored between ticks, while sleeping and between two messages of
    /// a batch.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(store = self.config.name.as_str(), "outbox relay started");

        while !*shutdown.borrow() {
            if let Err(error) = self.tick_with_shutdown(&shutdown).await {
                tracing::error!({
                    store = self.config.name.as_str(),
                    error = ?error,
                }, "outbox relay tick failed");
            }

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.polling_interval) => (),
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(store = self.config.name.as_str(), "outbox relay stopped");
    }

    #[tracing::instrument(name = "txoutbox.relay.tick", skip_all, fields(store = self.config.name.as_str()))]
    async fn relay_batch(&self, shutdown: Option<&watch::Receiver<bool>>) -> Result<TickReport, PersistenceError> {
        let messages: Vec<OutboxMessage> = self
            .store
            .fetch_pending(self.config.batch_size, self.config.max_attempts)
            .await?;

        let mut report = TickReport {
            fetched: messages.len(),
            ..TickReport::default()
        };

        if messages.is_empty() {
            return Ok(report);
        }

        let mut attempted: Vec<OutboxMessage> = Vec::with_capacity(messages.len());

        for mut message in messages {
            if shutdown.map_or(false, |shutdown| *shutdown.borrow()) {
                report.interrupted = true;
                break;
            }

            match self.deliver(&mut message).await {
                Ok(Outcome::Processed) => report.processed += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::DeadLettered) => report.dead_lettered += 1,
                Err(error) => {
                    tracing::warn!({
                        message_id = %message.id(),
                        error = %error,
                    }, "skipping outbox message in an unexpected state");
                    continue;
                }
            }

            attempted.push(message);
        }

        if attempted.is_empty() {
            return Ok(report);
        }

        if let Err(error) = self.store.record_outcomes(&attempted).await {
            tracing::error!({
                store = self.config.name.as_str(),
                messages = attempted.len(),
                error = ?error,
            }, "failed to record outbox delivery outcomes");

            return Err(error);
        }

        tracing::debug!(
            store = self.config.name.as_str(),
            fetched = report.fetched,
            processed = report.processed,
            failed = report.failed,
            dead_lettered = report.dead_lettered,
            "outbox batch relayed"
        );

        Ok(report)
    }

    async fn deliver(&self, message: &mut OutboxMessage) -> Result<Outcome, TransitionError> {
        let max_attempts: u32 = self.config.max_attempts;

        let payload: T = match self.registry.decode(message.event_type(), message.content()) {
            Ok(payload) => payload,
            Err(error) => {
                match self.config.poison_policy {
                    PoisonPolicy::DeadLetter => message.mark_poisoned(&error, max_attempts)?,
                    PoisonPolicy::Retry => message.mark_failed(&error)?,
                }

                return Ok(self.failed(message, &error));
            }
        };

        let envelope: Envelope<T> = Envelope::new(message, payload);

        match self.bus.publish(&envelope).await {
            Ok(()) => {
                message.mark_processed(Utc::now())?;
                metrics::counter!("txoutbox.relay.published", "store" => self.config.name.clone()).increment(1);
                Ok(Outcome::Processed)
            }
            Err(error) => {
                message.mark_failed(&error)?;
                Ok(self.failed(message, &error))
            }
        }
    }

    fn failed(&self, message: &OutboxMessage, error: &dyn std::error::Error) -> Outcome {
        if message.is_eligible(self.config.max_attempts) {
            tracing::warn!({
                store = self.config.name.as_str(),
                bus = self.bus.name(),
                message_id = %message.id(),
                event_type = message.event_type(),
                attempt_count = message.attempt_count(),
                error = %error,
            }, "outbox message delivery failed");

            metrics::counter!("txoutbox.relay.failed", "store" => self.config.name.clone()).increment(1);
            Outcome::Failed
        } else {
            tracing::warn!({
                store = self.config.name.as_str(),
                bus = self.bus.name(),
                message_id = %message.id(),
                event_type = message.event_type(),
                attempt_count = message.attempt_count(),
                error = %error,
            }, "outbox message dead-lettered");

            metrics::counter!("txoutbox.relay.dead_lettered", "store" => self.config.name.clone()).increment(1);
            Outcome::DeadLettered
        }
    }
}

impl<S, B, T> OutboxRelay<S, B, T>
where
    S: OutboxStore + 'static,
    B: EventBus<T> + Send + 'static,
    T: Send + Sync + 'static,
{
    /// Spawns [`OutboxRelay::run`] on the tokio runtime.
    pub fn start(self) -> RelayHandle {
        let (shutdown, receiver) = watch::channel(false);
        let join_handle: JoinHandle<()> = tokio::spawn(async move { self.run(receiver).await });

        RelayHandle { shutdown, join_handle }
    }
}

/// Handle of a relay spawned with [`OutboxRelay::start`].
pub struct RelayHandle {
    shutdown: watch::Sender<bool>,
    join_handle: JoinHandle<()>,
}

impl RelayHandle {
    /// The sender stopping the relay when `true` is sent, to wire it to OS signals or to a wider
    /// shutdown sequence.
    pub fn shutdown_signal(&self) -> &watch::Sender<bool> {
        &self.shutdown
    }

    /// Stops the relay and waits for it to finish. The batch in flight, if any, still records the
    /// outcomes of the messages it attempted.
    pub async fn stop(self) -> Result<(), JoinError> {
        let _ = self.shutdown.send(true);
        self.join_handle.await
    }
}
