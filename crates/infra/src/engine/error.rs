use rust_decimal::Decimal;
use thiserror::Error;

use costbook_core::DomainError;

use crate::command_dispatcher::{ConflictError, DispatchError};
use crate::event_store::EventStoreError;

/// Errors returned by [`CostingEngine`](super::CostingEngine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("insufficient finished-good stock (available: {available}, requested: {requested})")]
    InsufficientFinishedGoodStock { available: Decimal, requested: Decimal },

    #[error("not active: {0}")]
    NotActive(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Lost an optimistic-concurrency race (after retries, if any).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Timed out or lost the connection; nothing was written. Safe to retry.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("event store error: {0}")]
    Store(EventStoreError),

    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// Events were committed but not published.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StoreUnavailable(_) | EngineError::Conflict(_))
    }
}

/// Outcome of one failed attempt of a multi-stream operation.
///
/// Separates a lost optimistic-concurrency race, which is retried from
/// fresh reads, from every other failure, which is returned as is.
#[derive(Debug)]
pub(crate) enum AttemptError {
    Race(String),
    Failed(EngineError),
}

impl core::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AttemptError::Race(msg) => write!(f, "concurrent modification: {msg}"),
            AttemptError::Failed(err) => core::fmt::Display::fmt(err, f),
        }
    }
}

impl ConflictError for AttemptError {
    fn is_conflict(&self) -> bool {
        matches!(self, AttemptError::Race(_))
    }
}

impl From<EngineError> for AttemptError {
    fn from(value: EngineError) -> Self {
        AttemptError::Failed(value)
    }
}

impl From<DomainError> for AttemptError {
    fn from(value: DomainError) -> Self {
        AttemptError::Failed(value.into())
    }
}

impl From<DispatchError> for AttemptError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Concurrency(msg) => AttemptError::Race(msg),
            other => AttemptError::Failed(other.into()),
        }
    }
}

impl From<AttemptError> for EngineError {
    fn from(value: AttemptError) -> Self {
        match value {
            AttemptError::Race(msg) => EngineError::Conflict(msg),
            AttemptError::Failed(err) => err,
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::InvalidQuantity(msg) => EngineError::InvalidQuantity(msg),
            DomainError::InvariantViolation(msg) => EngineError::InvariantViolation(msg),
            DomainError::NotFound => EngineError::NotFound {
                entity: "aggregate",
                id: String::new(),
            },
            DomainError::NotActive(msg) => EngineError::NotActive(msg),
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
            DomainError::InsufficientStock {
                available,
                requested,
            } => EngineError::InsufficientFinishedGoodStock {
                available,
                requested,
            },
        }
    }
}

impl From<DispatchError> for EngineError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Concurrency(msg) => EngineError::Conflict(msg),
            DispatchError::Domain(err) => err.into(),
            DispatchError::Deserialize(msg) => EngineError::Deserialize(msg),
            DispatchError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            DispatchError::Store(err) => EngineError::Store(err),
            DispatchError::Publish(msg) => EngineError::Publish(msg),
        }
    }
}

impl From<EventStoreError> for EngineError {
    fn from(value: EventStoreError) -> Self {
        DispatchError::from(value).into()
    }
}
