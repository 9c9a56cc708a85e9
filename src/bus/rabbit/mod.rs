use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use bb8::ManageConnection;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::Serialize;

pub use config::RabbitEventBusConfig;
pub use error::RabbitEventBusError;

use crate::bus::{BusError, EventBus};
use crate::event::Envelope;

mod config;
mod error;

pub struct RabbitConnectionManager {
    url: String,
    connection_properties: ConnectionProperties,
}

#[async_trait]
impl ManageConnection for RabbitConnectionManager {
    type Connection = Connection;
    type Error = lapin::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Connection::connect(&self.url, self.connection_properties.to_owned()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        if self.has_broken(conn) {
            return Err(lapin::Error::InvalidConnectionState(conn.status().state()));
        }
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        !conn.status().connected()
    }
}

pub struct RabbitChannelManager {
    connection_pool: bb8::Pool<RabbitConnectionManager>,
    exchange: String,
    exchange_kind: ExchangeKind,
    exchange_options: ExchangeDeclareOptions,
    exchange_arguments: FieldTable,
    publisher_confirms: bool,
}

#[async_trait]
impl ManageConnection for RabbitChannelManager {
    type Connection = Channel;
    type Error = lapin::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let connection = match self.connection_pool.get().await {
            Ok(connection) => connection,
            Err(e) => match e {
                bb8::RunError::User(e) => return Err(e),
                bb8::RunError::TimedOut => return Err(lapin::Error::InvalidChannelState(lapin::ChannelState::Closed)),
            },
        };
        let channel = connection.create_channel().await?;
        if self.publisher_confirms {
            channel.confirm_select(ConfirmSelectOptions::default()).await?;
        }
        channel
            .exchange_declare(
                &self.exchange,
                self.exchange_kind.to_owned(),
                self.exchange_options,
                self.exchange_arguments.to_owned(),
            )
            .await?;
        Ok(channel)
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        if self.has_broken(conn) {
            return Err(lapin::Error::InvalidChannelState(conn.status().state()));
        }
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        !conn.status().connected()
    }
}

/// The [`RabbitEventBus`] provides an implementation of the `EventBus` trait for publishing
/// integration events using RabbitMQ as the underlying messaging system.
///
/// The AMQP message id is the outbox message id, the AMQP type is the event type. A publish
/// completes once the broker confirmed it, a `Nack` fails the delivery attempt.
pub struct RabbitEventBus<T> {
    channel_pool: bb8::Pool<RabbitChannelManager>,
    exchange: String,
    publish_routing_key: Option<String>,
    publish_options: BasicPublishOptions,
    publish_properties: BasicProperties,
    _phantom: PhantomData<fn(&T)>,
}

impl<T> RabbitEventBus<T> {
    pub async fn new(config: RabbitEventBusConfig<'_>) -> Result<RabbitEventBus<T>, RabbitEventBusError> {
        let connection_manager = RabbitConnectionManager {
            url: config.url.to_string(),
            connection_properties: config.connection_properties,
        };

        let connection_pool = bb8::Pool::builder()
            .max_size(2)
            .max_lifetime(Some(Duration::from_secs(10 * 60)))
            .idle_timeout(Some(Duration::from_secs(5 * 60)))
            .min_idle(Some(1))
            .build(connection_manager)
            .await?;

        let channel_manager = RabbitChannelManager {
            connection_pool,
            exchange: config.exchange.to_string(),
            exchange_kind: config.exchange_kind,
            exchange_options: config.exchange_options,
            exchange_arguments: config.exchange_arguments,
            publisher_confirms: config.publisher_confirms,
        };

        let channel_pool = bb8::Pool::builder()
            .max_size(10)
            .max_lifetime(Some(Duration::from_secs(5 * 60)))
            .idle_timeout(Some(Duration::from_secs(60)))
            .min_idle(Some(1))
            .build(channel_manager)
            .await?;

        Ok(Self {
            channel_pool,
            exchange: config.exchange.to_string(),
            publish_routing_key: config.publish_routing_key,
            publish_options: config.publish_options,
            publish_properties: config.publish_properties,
            _phantom: PhantomData,
        })
    }
}

#[async_trait]
impl<T> EventBus<T> for RabbitEventBus<T>
where
    T: Serialize + Sync,
{
    async fn publish(&self, envelope: &Envelope<T>) -> Result<(), BusError> {
        Ok(publish(self, envelope).await?)
    }
}

async fn publish<T>(reb: &RabbitEventBus<T>, envelope: &Envelope<T>) -> Result<(), RabbitEventBusError>
where
    T: Serialize,
{
    let bytes: Vec<u8> = serde_json::to_vec(envelope)?;
    let routing_key: &str = reb
        .publish_routing_key
        .as_deref()
        .unwrap_or(envelope.event_type.as_str());
    let properties: BasicProperties = reb
        .publish_properties
        .clone()
        .with_message_id(envelope.id.to_string().into())
        .with_type(envelope.event_type.clone().into());

    let channel = reb.channel_pool.get().await?;
    let confirmation: Confirmation = channel
        .basic_publish(reb.exchange.as_str(), routing_key, reb.publish_options, &bytes, properties)
        .await?
        .await?;

    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::NotRequested => Ok(()),
        Confirmation::Nack(_) => Err(RabbitEventBusError::PublishNack),
    }
}
