//! Stock ledger primitives.
//!
//! Raw materials and finished goods both keep an append-only list of signed
//! quantity movements. This crate holds the rules shared by both ledgers,
//! implemented as pure functions (no IO, no storage).

pub mod stock;

pub use stock::{LedgerEntry, MovementKind, available_quantity, chronological, clamp_at_zero};
