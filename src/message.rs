use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;
use crate::event::IntegrationEvent;

/// Maximum number of characters of a delivery failure kept in [`OutboxMessage::error`].
pub const MAX_ERROR_LENGTH: usize = 2000;

/// The durable unit of delivery state: a serialized integration event waiting to be published.
///
/// Outbox messages are created by reaction handlers inside a [`crate::UnitOfWork`], in the same
/// atomic write as the aggregate mutation that caused them, and are state-transitioned only by the
/// [`crate::relay::OutboxRelay`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Uniquely identifies the message, and the integration event it carries.
    pub(crate) id: Uuid,
    /// Discriminator resolving to a decoder in the [`crate::EventRegistry`].
    pub(crate) event_type: String,
    /// The serialized integration event.
    pub(crate) content: String,
    /// Assigned once, at creation.
    pub(crate) occurred_on: DateTime<Utc>,
    /// Set exactly once, when the message is published successfully.
    pub(crate) processed_on: Option<DateTime<Utc>>,
    /// Latest delivery failure.
    pub(crate) error: Option<String>,
    /// Number of failed delivery attempts.
    pub(crate) attempt_count: u32,
}

/// Delivery state of an [`OutboxMessage`]. It is derived from the stored fields and never stored
/// itself: a dead letter is just a message which ran out of attempts before being processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryState {
    Pending { attempts: u32 },
    Processed { at: DateTime<Utc> },
    DeadLetter { attempts: u32 },
}

impl OutboxMessage {
    /// Creates a new pending message stamped with the current time.
    pub fn new(event_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_occurred_on(event_type, content, monotonic_now())
    }

    /// Creates a new pending message with an explicit creation time. Mostly useful to import
    /// messages or to build fixtures; prefer [`OutboxMessage::new`].
    pub fn with_occurred_on(
        event_type: impl Into<String>,
        content: impl Into<String>,
        occurred_on: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            content: content.into(),
            occurred_on,
            processed_on: None,
            error: None,
            attempt_count: 0,
        }
    }

    /// Serializes an integration event into a new pending message.
    pub fn from_event<I: IntegrationEvent>(event: &I) -> Result<Self, serde_json::Error> {
        Ok(Self::new(I::EVENT_TYPE, serde_json::to_string(event)?))
    }

    /// Deserializes the content into the given integration event type.
    pub fn decode<I: IntegrationEvent>(&self) -> Result<I, serde_json::Error> {
        serde_json::from_str(&self.content)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }

    pub fn processed_on(&self) -> Option<DateTime<Utc>> {
        self.processed_on
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Returns the delivery state of the message given the retry budget.
    pub fn state(&self, max_attempts: u32) -> DeliveryState {
        match self.processed_on {
            Some(at) => DeliveryState::Processed { at },
            None if self.attempt_count >= max_attempts => DeliveryState::DeadLetter {
                attempts: self.attempt_count,
            },
            None => DeliveryState::Pending {
                attempts: self.attempt_count,
            },
        }
    }

    /// Returns `true` if the relay should still try to deliver this message.
    pub fn is_eligible(&self, max_attempts: u32) -> bool {
        matches!(self.state(max_attempts), DeliveryState::Pending { .. })
    }

    /// `Pending -> Processed`.
    pub(crate) fn mark_processed(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.ensure_unprocessed()?;
        self.processed_on = Some(now);
        Ok(())
    }

    /// `Pending -> Pending` with one more attempt, or `Pending -> DeadLetter` once the attempts
    /// reach the retry budget.
    pub(crate) fn mark_failed(&mut self, error: impl ToString) -> Result<(), TransitionError> {
        self.ensure_unprocessed()?;
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.error = Some(truncate(error.to_string()));
        Ok(())
    }

    /// Dead-letters a message whose content can never be delivered, whatever its attempt count.
    pub(crate) fn mark_poisoned(&mut self, error: impl ToString, max_attempts: u32) -> Result<(), TransitionError> {
        self.mark_failed(error)?;
        self.attempt_count = self.attempt_count.max(max_attempts);
        Ok(())
    }

    fn ensure_unprocessed(&self) -> Result<(), TransitionError> {
        match self.processed_on {
            Some(_) => Err(TransitionError::AlreadyProcessed(self.id)),
            None => Ok(()),
        }
    }
}

fn truncate(mut error: String) -> String {
    if let Some((index, _)) = error.char_indices().nth(MAX_ERROR_LENGTH) {
        error.truncate(index);
    }
    error
}

static LAST_OCCURRED_ON: AtomicI64 = AtomicI64::new(0);

/// Current time at microsecond precision (what Postgres stores), strictly increasing within the
/// process so that messages staged in a single commit keep the order they were raised in.
pub(crate) fn monotonic_now() -> DateTime<Utc> {
    let now: i64 = Utc::now().timestamp_micros();
    let mut last: i64 = LAST_OCCURRED_ON.load(Ordering::Relaxed);

    loop {
        let next: i64 = now.max(last + 1);
        match LAST_OCCURRED_ON.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return Utc.timestamp_micros(next).single().unwrap_or_else(Utc::now),
            Err(actual) => last = actual,
        }
    }
}
