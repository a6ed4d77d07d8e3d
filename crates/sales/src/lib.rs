//! Sales domain module (event-sourced).
//!
//! A sale records what was charged and the unit cost known at the time.
//! Profit figures are derived on read under an explicit [`CostTiming`].

pub mod figures;
pub mod sale;
pub mod summary;

pub use figures::{CostTiming, SaleFigures};
pub use sale::{
    RecordSale, Sale, SaleCommand, SaleEvent, SaleId, SaleRecorded, SaleVoided, VoidSale,
};
pub use summary::{MonthlySummary, summarize_by_month};
