//! Raw material domain module (event-sourced).
//!
//! A raw material owns an append-only stock ledger. Its unit cost is never
//! stored; [`valuation`] derives it from the ledger on every read.

pub mod raw_material;
pub mod stock_entry;
pub mod valuation;

pub use raw_material::{
    AdjustRawMaterialStock, ConsumeForProduction, DeleteRawMaterial, LegacyValuation,
    RawMaterial, RawMaterialCommand, RawMaterialDeleted, RawMaterialEvent, RawMaterialId,
    RawMaterialRegistered, RawMaterialUpdated, RecordPurchase, RegisterRawMaterial,
    StockEntryRecorded, UnitOfMeasure, UpdateRawMaterial,
};
pub use stock_entry::{AdjustmentReason, EntrySource, StockEntry};
pub use valuation::{CostBasis, Valuation, cost_basis, standard_unit_price, unit_cost};
