use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use costbook_core::AggregateId;

use super::r#trait::{
    EventStore, EventStoreError, StoredEvent, StreamAppend, validate_batch,
};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<AggregateId, Vec<StoredEvent>>,
    /// Stream ids in creation order.
    order: Vec<AggregateId>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    /// Total number of stored events across all streams.
    pub fn event_count(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.streams.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_atomic(
        &self,
        batch: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        validate_batch(&batch)?;

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        // Check every stream before writing anything.
        for append in &batch {
            let stream = inner
                .streams
                .get(&append.aggregate_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let current = Self::current_version(stream);

            if !append.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    append.aggregate_id, append.expected_version
                )));
            }

            // Enforce aggregate type stability across the stream.
            if let (Some(existing), Some(incoming)) = (stream.first(), append.events.first()) {
                if existing.aggregate_type != incoming.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, incoming.aggregate_type
                    )));
                }
            }
        }

        let mut committed = Vec::new();
        for append in batch {
            if append.events.is_empty() {
                continue;
            }
            if !inner.streams.contains_key(&append.aggregate_id) {
                inner.order.push(append.aggregate_id);
            }
            let stream = inner.streams.entry(append.aggregate_id).or_default();

            // Assign sequence numbers and append (append-only).
            let mut next = Self::current_version(stream) + 1;
            for e in append.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    async fn load_stream(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    async fn list_streams(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<AggregateId>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(inner
            .order
            .iter()
            .filter(|id| {
                inner
                    .streams
                    .get(id)
                    .and_then(|s| s.first())
                    .is_some_and(|e| e.aggregate_type == aggregate_type)
            })
            .copied()
            .collect())
    }
}
