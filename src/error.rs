/// Boxed error returned by user-provided code (reaction handlers, subscribers, transports).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error raised when the atomic write of a [`crate::Session`] or a store operation cannot
/// complete. Whenever this is returned nothing of the attempted write is visible.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    /// Error of the underlying database driver, e.g. a `sqlx::Error`.
    #[error(transparent)]
    Database(BoxError),
    /// Serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Optimistic concurrency check failed.
    #[error("concurrency conflict on {entity}: expected version {expected}, found {actual}")]
    Conflict { entity: String, expected: i64, actual: i64 },
    /// A uniqueness or integrity constraint would have been violated.
    #[error("constraint violation: {0}")]
    Constraint(String),
    /// The durable store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Error while running a reaction handler inside of the unit of work.
    #[error(transparent)]
    Handler(BoxError),
}

impl PersistenceError {
    /// Returns `true` if the write lost a race against a concurrent writer: an optimistic
    /// concurrency conflict, a unique violation or a serialization failure. Callers usually retry
    /// the whole business operation in this case.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::Constraint(_) => true,
            #[cfg(feature = "postgres")]
            Self::Database(error) => match error.downcast_ref::<sqlx::Error>() {
                // unique_violation, serialization_failure
                Some(sqlx::Error::Database(error)) => matches!(error.code().as_deref(), Some("23505") | Some("40001")),
                _ => false,
            },
            _ => false,
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for PersistenceError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database(Box::new(error))
    }
}

/// Error raised when a delivery state transition is not allowed.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TransitionError {
    #[error("outbox message {0} has already been processed")]
    AlreadyProcessed(uuid::Uuid),
}
