//! Event store abstraction + implementations.

pub mod configured;
pub mod in_memory;
pub mod postgres;
pub mod timeout;
pub mod r#trait;

pub use configured::ConfiguredEventStore;
pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use timeout::TimeoutEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
