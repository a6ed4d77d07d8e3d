use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use costbook_core::AggregateId;

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend};

/// Bounds every store call by a deadline.
///
/// An elapsed call surfaces as [`EventStoreError::Unavailable`]. For appends
/// the inner store either committed the whole batch or nothing; Postgres
/// rolls back a dropped transaction.
#[derive(Debug, Clone)]
pub struct TimeoutEventStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutEventStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, EventStoreError>
    where
        F: Future<Output = Result<T, EventStoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "event store call timed out");
                Err(EventStoreError::Unavailable(format!(
                    "{operation} timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl<S> EventStore for TimeoutEventStore<S>
where
    S: EventStore,
{
    async fn append_atomic(
        &self,
        batch: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.bounded("append_atomic", self.inner.append_atomic(batch))
            .await
    }

    async fn load_stream(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.bounded("load_stream", self.inner.load_stream(aggregate_id))
            .await
    }

    async fn list_streams(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<AggregateId>, EventStoreError> {
        self.bounded("list_streams", self.inner.list_streams(aggregate_type))
            .await
    }
}
