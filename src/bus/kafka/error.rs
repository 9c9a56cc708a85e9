use rdkafka::error::KafkaError;
use rdkafka::message::OwnedMessage;

use crate::bus::BusError;

/// Errors of the [`super::KafkaEventBus`]:
///
/// - `Json`: the envelope could not be serialized.
/// - `Kafka`: the producer could not be created, or the broker refused the record.
#[derive(thiserror::Error, Debug)]
pub enum KafkaEventBusError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Kafka(#[from] KafkaError),
}

impl From<(KafkaError, OwnedMessage)> for KafkaEventBusError {
    fn from((error, _): (KafkaError, OwnedMessage)) -> Self {
        Self::Kafka(error)
    }
}

impl From<KafkaEventBusError> for BusError {
    fn from(error: KafkaEventBusError) -> Self {
        Self::Transport(Box::new(error))
    }
}
