//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (for projections)
//! ```
//!
//! Multi-aggregate operations (production, sales) skip `dispatch` and
//! instead load several aggregates, decide events for each, stage them in a
//! [`UnitOfWork`] and `commit` it. The commit is all-or-nothing: every stream
//! is checked against the version it was loaded at.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use costbook_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use costbook_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (a stream moved since it was loaded).
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// Deterministic business failure from an aggregate.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// The store did not answer in time or lost its connection.
    #[error("event store unavailable: {0}")]
    Unavailable(String),

    /// Persisting to the event store failed.
    #[error("event store error: {0}")]
    Store(EventStoreError),

    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::Unavailable(msg) => DispatchError::Unavailable(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Errors that signal a lost optimistic-concurrency race.
pub trait ConflictError {
    fn is_conflict(&self) -> bool;
}

impl ConflictError for DispatchError {
    fn is_conflict(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

/// Run `operation` until it succeeds, fails with a non-conflict error, or
/// `max_attempts` attempts have been made.
///
/// Every attempt must re-read whatever it depends on; a retry never reuses
/// state loaded by a previous attempt.
pub async fn retry_on_conflict<T, E, F, Fut>(
    max_attempts: u32,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ConflictError + core::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match attempt_fn().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_conflict() && attempt < max_attempts => {
                warn!(operation, attempt, max_attempts, error = %err, "concurrent modification, retrying");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// An aggregate rehydrated from its stream, with the version it was read at.
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    pub aggregate: A,
    pub version: u64,
}

impl<A> Loaded<A> {
    pub fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.version)
    }
}

/// Events for several streams, committed together or not at all.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    appends: Vec<StreamAppend>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `events` for one stream, to be appended only if the stream is
    /// still at `expected_version` on commit.
    pub fn stage<E>(
        &mut self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected_version: u64,
        events: &[E],
    ) -> Result<(), DispatchError>
    where
        E: costbook_events::Event + Serialize,
    {
        if events.is_empty() {
            return Ok(());
        }

        let uncommitted = events
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        self.appends.push(StreamAppend {
            aggregate_id,
            expected_version: ExpectedVersion::Exact(expected_version),
            events: uncommitted,
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.appends.is_empty()
    }

    pub fn stream_count(&self) -> usize {
        self.appends.len()
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// ## Execution Guarantees
///
/// - Events are persisted before publication (if append fails, nothing is published)
/// - Optimistic concurrency is enforced on every stream written
/// - `dispatch` retries the whole load/decide/append cycle on a concurrency
///   conflict, up to `max_attempts` times
///
/// ## At-Least-Once Delivery
///
/// If publication fails after a successful append, `Publish` is returned.
/// The events are already persisted and projections are idempotent, so
/// republishing is safe.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    max_attempts: u32,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            max_attempts: 3,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate one aggregate.
    ///
    /// A stream that does not exist yields the `make_aggregate` state at version 0.
    pub async fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Loaded<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id).await?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        Ok(Loaded {
            aggregate,
            version: stream_version(&history),
        })
    }

    /// Load every aggregate of one type, oldest stream first.
    pub async fn load_all<A>(
        &self,
        aggregate_type: &str,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<Loaded<A>>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let ids = self.store.list_streams(aggregate_type).await?;
        let mut loaded = Vec::with_capacity(ids.len());
        for id in ids {
            loaded.push(self.load(id, &make_aggregate).await?);
        }
        Ok(loaded)
    }

    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// Returns the committed events (empty if the command was a no-op).
    pub async fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: costbook_events::Event + Serialize + DeserializeOwned,
    {
        let command = &command;
        let make_aggregate = &make_aggregate;
        retry_on_conflict(self.max_attempts, aggregate_type, move || {
            self.dispatch_once(aggregate_id, aggregate_type, command, make_aggregate)
        })
        .await
    }

    async fn dispatch_once<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: costbook_events::Event + Serialize + DeserializeOwned,
    {
        let loaded = self.load(aggregate_id, make_aggregate).await?;

        let decided = loaded.aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let mut unit = UnitOfWork::new();
        unit.stage(aggregate_id, aggregate_type, loaded.version, &decided)?;
        self.commit(unit).await
    }

    /// Append every staged stream atomically, then publish the committed events.
    pub async fn commit(&self, unit: UnitOfWork) -> Result<Vec<StoredEvent>, DispatchError> {
        if unit.is_empty() {
            return Ok(vec![]);
        }

        let committed = self.store.append_atomic(unit.appends).await?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // The stream must belong to the requested aggregate and increase strictly.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Flaky(bool);

    impl core::fmt::Display for Flaky {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            write!(f, "flaky(conflict={})", self.0)
        }
    }

    impl ConflictError for Flaky {
        fn is_conflict(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn retries_conflicts_until_success() {
        let calls = Cell::new(0);
        let result: Result<u32, Flaky> = retry_on_conflict(3, "test", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { if n < 3 { Err(Flaky(true)) } else { Ok(n) } }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), Flaky> = retry_on_conflict(2, "test", || {
            calls.set(calls.get() + 1);
            async { Err(Flaky(true)) }
        })
        .await;

        assert!(result.unwrap_err().0);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn does_not_retry_other_errors() {
        let calls = Cell::new(0);
        let result: Result<(), Flaky> = retry_on_conflict(5, "test", || {
            calls.set(calls.get() + 1);
            async { Err(Flaky(false)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn store_errors_map_to_dispatch_errors() {
        assert!(matches!(
            DispatchError::from(EventStoreError::Concurrency("x".into())),
            DispatchError::Concurrency(_)
        ));
        assert!(matches!(
            DispatchError::from(EventStoreError::Unavailable("x".into())),
            DispatchError::Unavailable(_)
        ));
        assert!(matches!(
            DispatchError::from(EventStoreError::InvalidAppend("x".into())),
            DispatchError::Store(_)
        ));
    }
}
