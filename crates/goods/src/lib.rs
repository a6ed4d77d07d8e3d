//! Finished good domain module (event-sourced).
//!
//! A finished good references one recipe, carries a target margin and owns a
//! stock ledger of "in"/"out" movements. Pricing is derived on read.

pub mod finished_good;
pub mod pricing;

pub use finished_good::{
    AdjustFinishedGoodStock, ChangeFinishedGoodStatus, CreateFinishedGood, DeleteFinishedGood,
    FinishedGood, FinishedGoodCommand, FinishedGoodCreated, FinishedGoodDeleted,
    FinishedGoodEvent, FinishedGoodId, FinishedGoodStatus, FinishedGoodStatusChanged,
    FinishedGoodStockEntry, FinishedGoodUpdated, GoodsEntrySource, GoodsStockRecorded,
    RecordProduction, RecordSaleOut, ReturnSaleStock, UpdateFinishedGood,
};
pub use pricing::{Pricing, price};
