use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use costbook_core::{Aggregate, AggregateRoot, DomainError, typed_id};
use costbook_events::Event;
use costbook_ledger::{available_quantity, clamp_at_zero};

use crate::stock_entry::{AdjustmentReason, EntrySource, StockEntry};
use crate::valuation::Valuation;

/// Stream type for raw material event streams.
pub const AGGREGATE_TYPE: &str = "materials.raw_material";

typed_id!(
    /// Raw material identifier.
    RawMaterialId
);

/// Base unit a raw material is tracked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfMeasure {
    Grams,
    Millilitres,
    Units,
}

/// Pre-ledger totals carried over from materials registered before the
/// stock ledger existed. Used for valuation only when the ledger has no
/// acquisitions; its quantity also seeds the opening on-hand balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyValuation {
    pub total_quantity: Decimal,
    pub total_value: Decimal,
}

/// Aggregate root: RawMaterial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMaterial {
    id: RawMaterialId,
    name: String,
    unit: UnitOfMeasure,
    legacy: Option<LegacyValuation>,
    entries: Vec<StockEntry>,
    on_hand: Decimal,
    version: u64,
    created: bool,
    deleted: bool,
}

impl RawMaterial {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RawMaterialId) -> Self {
        Self {
            id,
            name: String::new(),
            unit: UnitOfMeasure::Units,
            legacy: None,
            entries: Vec::new(),
            on_hand: Decimal::ZERO,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> RawMaterialId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> UnitOfMeasure {
        self.unit
    }

    pub fn legacy(&self) -> Option<&LegacyValuation> {
        self.legacy.as_ref()
    }

    pub fn entries(&self) -> &[StockEntry] {
        &self.entries
    }

    /// Persisted running total, floored at zero by production consumption.
    pub fn on_hand(&self) -> Decimal {
        self.on_hand
    }

    /// Opening balance plus the signed ledger sum. May be negative after a
    /// clamped production, unlike [`RawMaterial::on_hand`].
    pub fn ledger_quantity(&self) -> Decimal {
        let opening = self.legacy.map(|l| l.total_quantity).unwrap_or_default();
        opening + available_quantity(&self.entries)
    }

    /// True once registered and not deleted.
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn valuation(&self) -> Valuation {
        Valuation::derive(&self.entries, self.legacy.as_ref(), self.unit)
    }

    pub fn unit_cost(&self) -> Decimal {
        self.valuation().unit_cost
    }

    /// How much of `consumed` cannot be covered by current stock.
    pub fn shortfall_for(&self, consumed: Decimal) -> Option<Decimal> {
        (consumed > self.on_hand).then(|| consumed - self.on_hand)
    }
}

impl AggregateRoot for RawMaterial {
    type Id = RawMaterialId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterRawMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRawMaterial {
    pub raw_material_id: RawMaterialId,
    pub name: String,
    pub unit: UnitOfMeasure,
    pub legacy: Option<LegacyValuation>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateRawMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRawMaterial {
    pub raw_material_id: RawMaterialId,
    pub name: String,
    pub unit: UnitOfMeasure,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPurchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPurchase {
    pub raw_material_id: RawMaterialId,
    pub entry_id: Uuid,
    pub quantity: Decimal,
    pub total_cost: Decimal,
    pub supplier: Option<String>,
    pub purchased_at: DateTime<Utc>,
}

/// Command: AdjustRawMaterialStock (signed manual correction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustRawMaterialStock {
    pub raw_material_id: RawMaterialId,
    pub entry_id: Uuid,
    pub quantity: Decimal,
    pub reason: AdjustmentReason,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeForProduction.
///
/// `quantity` is the unsigned amount consumed by the production run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeForProduction {
    pub raw_material_id: RawMaterialId,
    pub entry_id: Uuid,
    pub quantity: Decimal,
    pub finished_good_name: String,
    pub quantity_produced: Decimal,
    pub produced_at: DateTime<Utc>,
}

/// Command: DeleteRawMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRawMaterial {
    pub raw_material_id: RawMaterialId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawMaterialCommand {
    Register(RegisterRawMaterial),
    Update(UpdateRawMaterial),
    RecordPurchase(RecordPurchase),
    AdjustStock(AdjustRawMaterialStock),
    ConsumeForProduction(ConsumeForProduction),
    Delete(DeleteRawMaterial),
}

/// Event: RawMaterialRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMaterialRegistered {
    pub raw_material_id: RawMaterialId,
    pub name: String,
    pub unit: UnitOfMeasure,
    pub legacy: Option<LegacyValuation>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RawMaterialUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMaterialUpdated {
    pub raw_material_id: RawMaterialId,
    pub name: String,
    pub unit: UnitOfMeasure,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockEntryRecorded.
///
/// `stock_after` is the persisted running total after this row; for
/// production consumption it is clamped at zero while `entry.quantity`
/// keeps the full consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntryRecorded {
    pub raw_material_id: RawMaterialId,
    pub entry: StockEntry,
    pub stock_after: Decimal,
}

/// Event: RawMaterialDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMaterialDeleted {
    pub raw_material_id: RawMaterialId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawMaterialEvent {
    RawMaterialRegistered(RawMaterialRegistered),
    RawMaterialUpdated(RawMaterialUpdated),
    StockEntryRecorded(StockEntryRecorded),
    RawMaterialDeleted(RawMaterialDeleted),
}

impl Event for RawMaterialEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RawMaterialEvent::RawMaterialRegistered(_) => "materials.raw_material.registered",
            RawMaterialEvent::RawMaterialUpdated(_) => "materials.raw_material.updated",
            RawMaterialEvent::StockEntryRecorded(_) => "materials.raw_material.stock_entry_recorded",
            RawMaterialEvent::RawMaterialDeleted(_) => "materials.raw_material.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RawMaterialEvent::RawMaterialRegistered(e) => e.occurred_at,
            RawMaterialEvent::RawMaterialUpdated(e) => e.occurred_at,
            RawMaterialEvent::StockEntryRecorded(e) => e.entry.recorded_at,
            RawMaterialEvent::RawMaterialDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for RawMaterial {
    type Command = RawMaterialCommand;
    type Event = RawMaterialEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RawMaterialEvent::RawMaterialRegistered(e) => {
                self.id = e.raw_material_id;
                self.name = e.name.clone();
                self.unit = e.unit;
                self.legacy = e.legacy;
                self.on_hand = e.legacy.map(|l| l.total_quantity).unwrap_or_default();
                self.created = true;
            }
            RawMaterialEvent::RawMaterialUpdated(e) => {
                self.name = e.name.clone();
                self.unit = e.unit;
            }
            RawMaterialEvent::StockEntryRecorded(e) => {
                self.entries.push(e.entry.clone());
                self.on_hand = e.stock_after;
            }
            RawMaterialEvent::RawMaterialDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RawMaterialCommand::Register(cmd) => self.handle_register(cmd),
            RawMaterialCommand::Update(cmd) => self.handle_update(cmd),
            RawMaterialCommand::RecordPurchase(cmd) => self.handle_purchase(cmd),
            RawMaterialCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            RawMaterialCommand::ConsumeForProduction(cmd) => self.handle_consume(cmd),
            RawMaterialCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

fn out_of_range() -> DomainError {
    DomainError::invalid_quantity("stock quantity exceeds the supported range")
}

impl RawMaterial {
    fn ensure_exists(&self, raw_material_id: RawMaterialId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.id != raw_material_id {
            return Err(DomainError::invariant("raw_material_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(
        &self,
        cmd: &RegisterRawMaterial,
    ) -> Result<Vec<RawMaterialEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("raw material already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if let Some(legacy) = cmd.legacy {
            if legacy.total_quantity < Decimal::ZERO || legacy.total_value < Decimal::ZERO {
                return Err(DomainError::validation("legacy totals cannot be negative"));
            }
        }
        Ok(vec![RawMaterialEvent::RawMaterialRegistered(
            RawMaterialRegistered {
                raw_material_id: cmd.raw_material_id,
                name: cmd.name.trim().to_string(),
                unit: cmd.unit,
                legacy: cmd.legacy,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_update(&self, cmd: &UpdateRawMaterial) -> Result<Vec<RawMaterialEvent>, DomainError> {
        self.ensure_exists(cmd.raw_material_id)?;
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(vec![RawMaterialEvent::RawMaterialUpdated(RawMaterialUpdated {
            raw_material_id: cmd.raw_material_id,
            name: cmd.name.trim().to_string(),
            unit: cmd.unit,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_purchase(&self, cmd: &RecordPurchase) -> Result<Vec<RawMaterialEvent>, DomainError> {
        self.ensure_exists(cmd.raw_material_id)?;
        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::invalid_quantity(
                "purchased quantity must be positive",
            ));
        }
        if cmd.total_cost < Decimal::ZERO {
            return Err(DomainError::validation("total cost cannot be negative"));
        }

        let stock_after = self
            .on_hand
            .checked_add(cmd.quantity)
            .ok_or_else(out_of_range)?;

        let supplier = cmd
            .supplier
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(vec![self.record(
            StockEntry {
                entry_id: cmd.entry_id,
                quantity: cmd.quantity,
                total_cost: cmd.total_cost,
                recorded_at: cmd.purchased_at,
                source: EntrySource::Purchase { supplier },
            },
            stock_after,
        )])
    }

    fn handle_adjust(
        &self,
        cmd: &AdjustRawMaterialStock,
    ) -> Result<Vec<RawMaterialEvent>, DomainError> {
        self.ensure_exists(cmd.raw_material_id)?;
        if cmd.quantity.is_zero() {
            return Err(DomainError::invalid_quantity("adjustment cannot be zero"));
        }

        let stock_after = self
            .on_hand
            .checked_add(cmd.quantity)
            .ok_or_else(out_of_range)?;
        if stock_after < Decimal::ZERO {
            return Err(DomainError::insufficient_stock(self.on_hand, -cmd.quantity));
        }

        Ok(vec![self.record(
            StockEntry {
                entry_id: cmd.entry_id,
                quantity: cmd.quantity,
                total_cost: Decimal::ZERO,
                recorded_at: cmd.occurred_at,
                source: EntrySource::Adjustment {
                    reason: cmd.reason,
                    note: cmd.note.clone(),
                },
            },
            stock_after,
        )])
    }

    fn handle_consume(
        &self,
        cmd: &ConsumeForProduction,
    ) -> Result<Vec<RawMaterialEvent>, DomainError> {
        self.ensure_exists(cmd.raw_material_id)?;
        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::invalid_quantity(
                "consumed quantity must be positive",
            ));
        }

        // Shortfalls clamp instead of failing; the row keeps the full amount.
        let stock_after = clamp_at_zero(self.on_hand.saturating_sub(cmd.quantity));

        Ok(vec![self.record(
            StockEntry {
                entry_id: cmd.entry_id,
                quantity: -cmd.quantity,
                total_cost: Decimal::ZERO,
                recorded_at: cmd.produced_at,
                source: EntrySource::Production {
                    finished_good_name: cmd.finished_good_name.clone(),
                    quantity_produced: cmd.quantity_produced,
                },
            },
            stock_after,
        )])
    }

    fn handle_delete(&self, cmd: &DeleteRawMaterial) -> Result<Vec<RawMaterialEvent>, DomainError> {
        self.ensure_exists(cmd.raw_material_id)?;
        Ok(vec![RawMaterialEvent::RawMaterialDeleted(RawMaterialDeleted {
            raw_material_id: cmd.raw_material_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn record(&self, entry: StockEntry, stock_after: Decimal) -> RawMaterialEvent {
        RawMaterialEvent::StockEntryRecorded(StockEntryRecorded {
            raw_material_id: self.id,
            entry,
            stock_after,
        })
    }
}
