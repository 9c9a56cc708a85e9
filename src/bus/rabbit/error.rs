use crate::bus::BusError;

/// The `RabbitEventBusError` enum defines the following error types:
///
/// - `Json`: Indicates a failure in serializing the envelope.
/// - `Rabbit`: Indicates an error occurred while establishing a connection with the RabbitMQ server
///             or an error encountered during the event publishing process.
/// - `Pool`: Indicates that no channel became available in time.
/// - `PublishNack`: Indicates the server responded to the publish with a `Nack`.
#[derive(thiserror::Error, Debug)]
pub enum RabbitEventBusError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Rabbit(#[from] lapin::Error),
    #[error("Timed out waiting for a channel")]
    Pool,
    #[error("Received nack on publish")]
    PublishNack,
}

impl From<bb8::RunError<lapin::Error>> for RabbitEventBusError {
    fn from(error: bb8::RunError<lapin::Error>) -> Self {
        match error {
            bb8::RunError::User(error) => Self::Rabbit(error),
            bb8::RunError::TimedOut => Self::Pool,
        }
    }
}

impl From<RabbitEventBusError> for BusError {
    fn from(error: RabbitEventBusError) -> Self {
        Self::Transport(Box::new(error))
    }
}
