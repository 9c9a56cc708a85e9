use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, ConnectionProperties, ExchangeKind};
use typed_builder::TypedBuilder;

#[derive(TypedBuilder)]
pub struct RabbitEventBusConfig<'a> {
    /// The connection string for the RabbitMQ server, including the protocol, host, port, and
    /// virtual host.
    pub(crate) url: &'a str,
    /// The name of the RabbitMQ exchange to use for publishing events.
    pub(crate) exchange: &'a str,
    /// Additional connection properties.
    #[builder(default)]
    pub(crate) connection_properties: ConnectionProperties,
    /// The type of the RabbitMQ exchange, such as "direct", "topic", "fanout", etc.
    /// Defaults to "direct" if not specified.
    pub(crate) exchange_kind: ExchangeKind,
    /// Additional exchange options.
    #[builder(default)]
    pub(crate) exchange_options: ExchangeDeclareOptions,
    /// Additional exchange arguments.
    #[builder(default)]
    pub(crate) exchange_arguments: FieldTable,
    /// Optional routing key configuration. The routing key is a string value attached to each message
    /// during the publishing process. When not set, the event type of the envelope is used, so that
    /// topic exchanges can route on it.
    #[builder(default)]
    pub(crate) publish_routing_key: Option<String>,
    /// Additional publish options.
    #[builder(default)]
    pub(crate) publish_options: BasicPublishOptions,
    /// Additional publish properties. The message id is always overwritten with the id of the
    /// outbox message.
    #[builder(default)]
    pub(crate) publish_properties: BasicProperties,
    /// Whether to wait for publisher confirms before reporting the publish as done. Without
    /// confirms a message lost by the broker is never retried.
    #[builder(default = true)]
    pub(crate) publisher_confirms: bool,
}
