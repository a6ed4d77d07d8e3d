use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use costbook_core::Entity;
use costbook_ledger::LedgerEntry;

/// Reason code attached to a manual stock correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    InventoryCount,
    Damage,
    Expiration,
    Theft,
    ProductionError,
    SupplierReturn,
    Other,
}

impl AdjustmentReason {
    pub fn as_str(self) -> &'static str {
        match self {
            AdjustmentReason::InventoryCount => "inventory_count",
            AdjustmentReason::Damage => "damage",
            AdjustmentReason::Expiration => "expiration",
            AdjustmentReason::Theft => "theft",
            AdjustmentReason::ProductionError => "production_error",
            AdjustmentReason::SupplierReturn => "supplier_return",
            AdjustmentReason::Other => "other",
        }
    }
}

impl core::fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a ledger row came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntrySource {
    Purchase {
        supplier: Option<String>,
    },
    Adjustment {
        reason: AdjustmentReason,
        note: Option<String>,
    },
    Production {
        finished_good_name: String,
        quantity_produced: Decimal,
    },
}

/// A raw-material ledger row.
///
/// Positive quantities are acquisitions and carry the total paid; negative
/// quantities are consumption or corrections and carry zero cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub entry_id: Uuid,
    pub quantity: Decimal,
    pub total_cost: Decimal,
    pub recorded_at: DateTime<Utc>,
    pub source: EntrySource,
}

impl StockEntry {
    pub fn is_acquisition(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /// Human-readable origin of the row, if any.
    pub fn provenance(&self) -> Option<String> {
        match &self.source {
            EntrySource::Purchase { supplier } => supplier.clone(),
            EntrySource::Adjustment { reason, .. } => Some(format!("adjustment: {reason}")),
            EntrySource::Production {
                finished_good_name,
                quantity_produced,
            } => Some(format!(
                "production: {finished_good_name} ({} units)",
                quantity_produced.normalize()
            )),
        }
    }
}

impl LedgerEntry for StockEntry {
    fn signed_quantity(&self) -> Decimal {
        self.quantity
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl Entity for StockEntry {
    type Id = Uuid;

    fn id(&self) -> &Self::Id {
        &self.entry_id
    }
}
