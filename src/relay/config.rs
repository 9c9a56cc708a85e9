use std::time::Duration;

use typed_builder::TypedBuilder;

/// What the relay does with a message it cannot decode: unknown event type or malformed content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PoisonPolicy {
    /// Dead-letter the message at once. Retrying the same content would fail the same way.
    #[default]
    DeadLetter,
    /// Count the failure as a normal delivery attempt, e.g. while a rolling deploy is still
    /// registering the decoder of a new event type.
    Retry,
}

/// Configuration of an [`super::OutboxRelay`].
///
/// ```rust
/// use std::time::Duration;
/// use txoutbox::relay::RelayConfig;
///
/// let config = RelayConfig::builder()
///     .name("hr")
///     .polling_interval(Duration::from_secs(5))
///     .build();
///
/// assert_eq!(config.batch_size, 100);
/// assert!(config.validate().is_ok());
/// ```
#[derive(TypedBuilder, Clone, Debug)]
pub struct RelayConfig {
    /// Label of the store the relay drains, used in logs and as the `store` metrics label.
    #[builder(default = "outbox".to_string(), setter(into))]
    pub name: String,
    /// Time waited between two ticks.
    #[builder(default = Duration::from_secs(60))]
    pub polling_interval: Duration,
    /// Maximum number of messages fetched and delivered in a tick.
    #[builder(default = 100)]
    pub batch_size: usize,
    /// Failed attempts after which a message is dead-lettered.
    #[builder(default = 5)]
    pub max_attempts: u32,
    #[builder(default)]
    pub poison_policy: PoisonPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RelayConfig {
    /// Rejects configurations the relay could not make progress with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }

        if self.polling_interval.is_zero() {
            return Err(ConfigError::ZeroPollingInterval);
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("relay name must not be empty")]
    EmptyName,
    #[error("polling interval must be greater than zero")]
    ZeroPollingInterval,
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,
    #[error("max attempts must be greater than zero")]
    ZeroMaxAttempts,
}
