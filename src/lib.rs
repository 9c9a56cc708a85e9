//! Transactional outbox for services built around aggregates.
//!
//! Business operations commit their state changes through a [`UnitOfWork`]: the domain events
//! raised on the aggregates are translated by [`ReactionHandler`]s into [`OutboxMessage`]s and
//! persisted in the same atomic write as the state change. An [`relay::OutboxRelay`] then moves
//! the messages from the [`store::OutboxStore`] to an [`bus::EventBus`], at least once.

pub use crate::aggregate::{Aggregate, EventQueue};
pub use crate::error::{BoxError, PersistenceError, TransitionError};
pub use crate::event::{DecodeError, Envelope, EventRegistry, IntegrationEvent};
pub use crate::handler::{IntegrationEventHandler, ReactionHandler};
pub use crate::message::{DeliveryState, OutboxMessage, MAX_ERROR_LENGTH};
pub use crate::uow::{ReactionHandlers, Session, UnitOfWork};

#[cfg(feature = "macros")]
pub use txoutbox_macros::IntegrationEvent;

mod aggregate;
pub mod bus;
mod error;
mod event;
mod handler;
mod message;
pub mod relay;
#[cfg(feature = "postgres")]
mod sql;
pub mod store;
mod uow;
