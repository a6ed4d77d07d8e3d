use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use costbook_core::{AggregateId, ExpectedVersion};

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Built from a typed domain event with [`UncommittedEvent::from_typed`],
/// which serializes the payload and captures the metadata needed to
/// deserialize it again on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream (assigned a sequence number).
///
/// Sequence numbers are assigned by the store, start at 1, and increase by
/// one per event within a stream. The last one is the stream version used
/// as the optimistic concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into an envelope for publication.
    pub fn to_envelope(&self) -> costbook_events::EventEnvelope<JsonValue> {
        costbook_events::EventEnvelope::new(
            self.event_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.event_type.clone(),
            self.occurred_at,
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Events for one stream inside an atomic multi-stream append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAppend {
    pub aggregate_id: AggregateId,
    pub expected_version: ExpectedVersion,
    pub events: Vec<UncommittedEvent>,
}

/// Event store operation error.
///
/// Infrastructure failures (storage, concurrency, availability) as opposed
/// to domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// Transient failure (timeout, lost connection). Nothing was committed.
    #[error("event store unavailable: {0}")]
    Unavailable(String),

    #[error("event publication failed: {0}")]
    Publish(String),
}

impl EventStoreError {
    /// Whether retrying the same operation from fresh reads may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventStoreError::Concurrency(_) | EventStoreError::Unavailable(_)
        )
    }
}

/// Append-only event store.
///
/// Events are organized into **streams**, one per aggregate instance, keyed
/// by `aggregate_id`. Within a stream sequence numbers are 1, 2, 3, ...
///
/// ## Append Semantics
///
/// `append_atomic()` is the primitive. For every stream in the batch it:
/// - validates that the events target that stream and one aggregate type
/// - checks the stream version against `expected_version`
/// - assigns sequence numbers starting at `current_version + 1`
///
/// and commits **all streams or none**. A single version mismatch rejects
/// the whole batch with `Concurrency`.
///
/// ## Load Semantics
///
/// `load_stream()` returns the stream in sequence order, or an empty vector
/// if it does not exist. `list_streams()` returns the ids of every stream of
/// one aggregate type, oldest first.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to a single stream.
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let aggregate_id = first.aggregate_id;
        self.append_atomic(vec![StreamAppend {
            aggregate_id,
            expected_version,
            events,
        }])
        .await
    }

    /// Append to several streams as one all-or-nothing unit.
    async fn append_atomic(
        &self,
        batch: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for an aggregate.
    async fn load_stream(&self, aggregate_id: AggregateId)
    -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Ids of every stream of `aggregate_type`.
    async fn list_streams(&self, aggregate_type: &str)
    -> Result<Vec<AggregateId>, EventStoreError>;
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version).await
    }

    async fn append_atomic(
        &self,
        batch: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append_atomic(batch).await
    }

    async fn load_stream(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_id).await
    }

    async fn list_streams(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<AggregateId>, EventStoreError> {
        (**self).list_streams(aggregate_type).await
    }
}

impl UncommittedEvent {
    /// Convenience constructor from a typed domain event.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: costbook_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// Validate the shape of an atomic batch before touching storage.
///
/// Every event must belong to its `StreamAppend`'s aggregate, each stream
/// must use one aggregate type, and no stream may appear twice.
pub(crate) fn validate_batch(batch: &[StreamAppend]) -> Result<(), EventStoreError> {
    let mut seen = Vec::with_capacity(batch.len());
    for append in batch {
        if seen.contains(&append.aggregate_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} appears twice in one batch",
                append.aggregate_id
            )));
        }
        seen.push(append.aggregate_id);

        let Some(first) = append.events.first() else {
            continue;
        };
        for (idx, e) in append.events.iter().enumerate() {
            if e.aggregate_id != append.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch for {} contains event of {} (index {idx})",
                    append.aggregate_id, e.aggregate_id
                )));
            }
            if e.aggregate_type != first.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch for {} contains multiple aggregate_types (index {idx})",
                    append.aggregate_id
                )));
            }
        }
    }
    Ok(())
}
