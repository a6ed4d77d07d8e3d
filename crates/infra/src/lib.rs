//! Infrastructure layer: event storage, command dispatch, read models,
//! configuration, and the costing engine that ties the domain crates together.

pub mod command_dispatcher;
pub mod config;
pub mod engine;
pub mod event_store;
pub mod projections;
pub mod read_model;

pub use config::EngineConfig;
pub use engine::{CostingEngine, EngineError};

#[cfg(test)]
mod integration_tests;
