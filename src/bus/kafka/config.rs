use rdkafka::ClientConfig;
use typed_builder::TypedBuilder;

#[derive(TypedBuilder)]
pub struct KafkaEventBusConfig<'a> {
    /// A list of Kafka broker addresses in the format `host:port`. Multiple addresses can be
    /// specified for broker redundancy.
    pub(crate) broker_url_list: &'a str,
    /// The topic every envelope is published to.
    pub(crate) topic: &'a str,
    /// An optional configuration to enable SASL security for authorizing an event bus to publish
    /// events to a specific topic.
    #[builder(default, setter(strip_option))]
    pub(crate) security: Option<Security<'a>>,
    /// The maximum time in milliseconds the broker will wait for acknowledgments from replicas
    /// before returning an error.
    #[builder(default = 5000)]
    pub(crate) request_timeout: u64,
    /// Additional Kafka client configuration.
    #[builder(default, setter(strip_option))]
    pub(crate) client_config: Option<ClientConfig>,
}

pub struct Security<'a> {
    pub(crate) username: &'a str,
    pub(crate) password: &'a str,
    pub(crate) sasl_mechanism: &'a str,
}

impl<'a> Security<'a> {
    pub fn new(username: &'a str, password: &'a str, sasl_mechanism: &'a str) -> Self {
        Self {
            username,
            password,
            sasl_mechanism,
        }
    }
}
