use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde::Serialize;

pub use config::{KafkaEventBusConfig, Security};
pub use error::KafkaEventBusError;

use crate::bus::{BusError, EventBus};
use crate::event::Envelope;

mod config;
mod error;

/// The [`KafkaEventBus`] provides an implementation of the `EventBus` trait for publishing
/// integration events using Apache Kafka as the underlying messaging system.
///
/// Records are keyed by the outbox message id and carry the event type in the `event_type` header.
/// The record is acknowledged by the broker before the relay marks the message as processed.
pub struct KafkaEventBus<T> {
    producer: FutureProducer,
    topic: String,
    request_timeout: Duration,
    _phantom: PhantomData<fn(&T)>,
}

impl<T> KafkaEventBus<T> {
    pub async fn new(config: KafkaEventBusConfig<'_>) -> Result<KafkaEventBus<T>, KafkaEventBusError> {
        let mut client_config: ClientConfig = config.client_config.unwrap_or_default();
        client_config
            .set("metadata.broker.list", config.broker_url_list)
            .set("request.timeout.ms", config.request_timeout.to_string());

        if let Some(security) = config.security {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", security.sasl_mechanism)
                .set("sasl.username", security.username)
                .set("sasl.password", security.password);
        }

        Ok(Self {
            producer: client_config.create()?,
            topic: config.topic.to_string(),
            request_timeout: Duration::from_millis(config.request_timeout),
            _phantom: PhantomData,
        })
    }
}

#[async_trait]
impl<T> EventBus<T> for KafkaEventBus<T>
where
    T: Serialize + Sync,
{
    async fn publish(&self, envelope: &Envelope<T>) -> Result<(), BusError> {
        Ok(publish(self, envelope).await?)
    }
}

async fn publish<T>(event_bus: &KafkaEventBus<T>, envelope: &Envelope<T>) -> Result<(), KafkaEventBusError>
where
    T: Serialize,
{
    let key: String = envelope.id.to_string();
    let bytes: Vec<u8> = serde_json::to_vec(envelope)?;
    let headers: OwnedHeaders = OwnedHeaders::new().insert(Header {
        key: "event_type",
        value: Some(envelope.event_type.as_str()),
    });

    let _ = event_bus
        .producer
        .send(
            FutureRecord::<String, Vec<u8>>::to(event_bus.topic.as_str())
                .key(&key)
                .payload(&bytes)
                .headers(headers),
            event_bus.request_timeout,
        )
        .await?;

    Ok(())
}
