use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::OutboxMessage;

/// The externally publishable form of a domain event.
///
/// `EVENT_TYPE` is written alongside every outbox message and is how the relay finds the decoder
/// for it, so it must stay stable across releases. It can be derived:
///
/// ```rust
/// # #[cfg(feature = "macros")]
/// # {
/// use serde::{Deserialize, Serialize};
/// use txoutbox::IntegrationEvent;
///
/// #[derive(Serialize, Deserialize, IntegrationEvent)]
/// #[integration_event(name = "employees.hired")]
/// pub struct EmployeeHired {
///     pub employee_id: u64,
/// }
///
/// assert_eq!(EmployeeHired::EVENT_TYPE, "employees.hired");
/// # }
/// ```
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    const EVENT_TYPE: &'static str;
}

/// Error returned when an outbox message cannot be turned back into an integration event. Retrying
/// the same content will never fix it.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("no decoder registered for event type `{0}`")]
    UnknownType(String),
    #[error("cannot decode `{event_type}` payload: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

type Decoder<T> = Box<dyn Fn(&str) -> Result<T, serde_json::Error> + Send + Sync>;

/// Lookup table from event type discriminator to decoder, populated once at startup.
///
/// All the decoders of a registry produce the same type `T`, usually an enum wrapping every
/// integration event a module publishes.
pub struct EventRegistry<T> {
    decoders: HashMap<&'static str, Decoder<T>>,
}

impl<T> Default for EventRegistry<T> {
    fn default() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }
}

impl<T> EventRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the decoder of the integration event `I`. Registering the same event type twice
    /// replaces the previous decoder.
    pub fn register<I>(mut self) -> Self
    where
        I: IntegrationEvent + Into<T>,
        T: 'static,
    {
        let decoder: Decoder<T> = Box::new(|content: &str| serde_json::from_str::<I>(content).map(Into::into));

        if self.decoders.insert(I::EVENT_TYPE, decoder).is_some() {
            tracing::warn!(event_type = I::EVENT_TYPE, "integration event decoder registered twice");
        }

        self
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Decodes the content of an outbox message.
    pub fn decode(&self, event_type: &str, content: &str) -> Result<T, DecodeError> {
        let decoder = self
            .decoders
            .get(event_type)
            .ok_or_else(|| DecodeError::UnknownType(event_type.to_string()))?;

        decoder(content).map_err(|source| DecodeError::Payload {
            event_type: event_type.to_string(),
            source,
        })
    }
}

impl<T> Debug for EventRegistry<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A decoded integration event alongside the metadata of the outbox message carrying it. This is
/// what gets published on an [`crate::bus::EventBus`].
#[derive(Clone, Debug, Serialize)]
pub struct Envelope<T> {
    /// Identifier of the outbox message. Stable across redeliveries, consumers can use it to
    /// deduplicate.
    pub id: Uuid,
    pub event_type: String,
    pub occurred_on: DateTime<Utc>,
    /// 1-based number of this delivery attempt.
    pub attempt: u32,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub(crate) fn new(message: &OutboxMessage, payload: T) -> Self {
        Self {
            id: message.id(),
            event_type: message.event_type().to_string(),
            occurred_on: message.occurred_on(),
            attempt: message.attempt_count().saturating_add(1),
            payload,
        }
    }
}
