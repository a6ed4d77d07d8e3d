//! `costbook-events`: event primitives shared by the costing aggregates.
//!
//! Events are the append-only facts the ledgers are made of; envelopes carry
//! them with stream metadata; the bus fans committed envelopes out to read
//! models.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
