//! Store selection from [`EngineConfig`]: Postgres when a database URL is
//! configured, in-memory otherwise.

use async_trait::async_trait;

use costbook_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
use super::{InMemoryEventStore, PostgresEventStore};
use crate::config::EngineConfig;

/// The event store an engine built from configuration runs on.
#[derive(Debug)]
pub enum ConfiguredEventStore {
    InMemory(InMemoryEventStore),
    Postgres(PostgresEventStore),
}

impl ConfiguredEventStore {
    /// Connect to `config.database_url` and ensure the schema exists, or
    /// fall back to a fresh in-memory store when no URL is set.
    pub async fn from_config(config: &EngineConfig) -> Result<Self, EventStoreError> {
        match config.database_url.as_deref() {
            Some(url) => {
                let store = PostgresEventStore::connect(url).await?;
                store.ensure_schema().await?;
                tracing::info!("using postgres event store");
                Ok(Self::Postgres(store))
            }
            None => {
                tracing::info!("DATABASE_URL not set, using in-memory event store");
                Ok(Self::InMemory(InMemoryEventStore::new()))
            }
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Postgres(_))
    }
}

#[async_trait]
impl EventStore for ConfiguredEventStore {
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        match self {
            Self::InMemory(store) => store.append(events, expected_version).await,
            Self::Postgres(store) => store.append(events, expected_version).await,
        }
    }

    async fn append_atomic(
        &self,
        batch: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        match self {
            Self::InMemory(store) => store.append_atomic(batch).await,
            Self::Postgres(store) => store.append_atomic(batch).await,
        }
    }

    async fn load_stream(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        match self {
            Self::InMemory(store) => store.load_stream(aggregate_id).await,
            Self::Postgres(store) => store.load_stream(aggregate_id).await,
        }
    }

    async fn list_streams(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<AggregateId>, EventStoreError> {
        match self {
            Self::InMemory(store) => store.list_streams(aggregate_type).await,
            Self::Postgres(store) => store.list_streams(aggregate_type).await,
        }
    }
}
