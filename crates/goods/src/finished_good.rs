use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use costbook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Entity, typed_id};
use costbook_events::Event;
use costbook_ledger::{LedgerEntry, MovementKind, available_quantity};
use costbook_materials::AdjustmentReason;
use costbook_recipes::RecipeId;

/// Stream type for finished good event streams.
pub const AGGREGATE_TYPE: &str = "goods.finished_good";

typed_id!(
    /// Finished good identifier.
    FinishedGoodId
);

/// Lifecycle status. Only `Active` goods may be produced or sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishedGoodStatus {
    Active,
    Inactive,
    Trial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoodsEntrySource {
    Production,
    Sale { sale_id: AggregateId },
    SaleVoided { sale_id: AggregateId },
    Adjustment { reason: AdjustmentReason },
}

/// A finished-good ledger row. Quantity is always positive; `kind` carries
/// the direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedGoodStockEntry {
    pub entry_id: Uuid,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub recorded_at: DateTime<Utc>,
    pub source: GoodsEntrySource,
}

impl LedgerEntry for FinishedGoodStockEntry {
    fn signed_quantity(&self) -> Decimal {
        self.kind.signed(self.quantity)
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl Entity for FinishedGoodStockEntry {
    type Id = Uuid;

    fn id(&self) -> &Self::Id {
        &self.entry_id
    }
}

/// Aggregate root: FinishedGood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedGood {
    id: FinishedGoodId,
    name: String,
    recipe_id: Option<RecipeId>,
    margin_percent: Decimal,
    status: FinishedGoodStatus,
    category: Option<String>,
    description: Option<String>,
    entries: Vec<FinishedGoodStockEntry>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl FinishedGood {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: FinishedGoodId) -> Self {
        Self {
            id,
            name: String::new(),
            recipe_id: None,
            margin_percent: Decimal::ZERO,
            status: FinishedGoodStatus::Inactive,
            category: None,
            description: None,
            entries: Vec::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> FinishedGoodId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Always `Some` once created.
    pub fn recipe_id(&self) -> Option<RecipeId> {
        self.recipe_id
    }

    pub fn margin_percent(&self) -> Decimal {
        self.margin_percent
    }

    pub fn status(&self) -> FinishedGoodStatus {
        self.status
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn entries(&self) -> &[FinishedGoodStockEntry] {
        &self.entries
    }

    pub fn available_quantity(&self) -> Decimal {
        available_quantity(&self.entries)
    }

    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_active(&self) -> bool {
        self.status == FinishedGoodStatus::Active
    }
}

impl AggregateRoot for FinishedGood {
    type Id = FinishedGoodId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateFinishedGood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFinishedGood {
    pub finished_good_id: FinishedGoodId,
    pub name: String,
    pub recipe_id: RecipeId,
    pub margin_percent: Decimal,
    pub status: FinishedGoodStatus,
    pub category: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateFinishedGood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFinishedGood {
    pub finished_good_id: FinishedGoodId,
    pub name: String,
    pub recipe_id: RecipeId,
    pub margin_percent: Decimal,
    pub category: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeFinishedGoodStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFinishedGoodStatus {
    pub finished_good_id: FinishedGoodId,
    pub status: FinishedGoodStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordProduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordProduction {
    pub finished_good_id: FinishedGoodId,
    pub entry_id: Uuid,
    pub quantity: Decimal,
    pub produced_at: DateTime<Utc>,
}

/// Command: RecordSaleOut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSaleOut {
    pub finished_good_id: FinishedGoodId,
    pub entry_id: Uuid,
    pub sale_id: AggregateId,
    pub quantity: Decimal,
    pub sold_at: DateTime<Utc>,
}

/// Command: ReturnSaleStock (compensates a voided sale).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSaleStock {
    pub finished_good_id: FinishedGoodId,
    pub entry_id: Uuid,
    pub sale_id: AggregateId,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustFinishedGoodStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustFinishedGoodStock {
    pub finished_good_id: FinishedGoodId,
    pub entry_id: Uuid,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub reason: AdjustmentReason,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteFinishedGood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFinishedGood {
    pub finished_good_id: FinishedGoodId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishedGoodCommand {
    Create(CreateFinishedGood),
    Update(UpdateFinishedGood),
    ChangeStatus(ChangeFinishedGoodStatus),
    RecordProduction(RecordProduction),
    RecordSaleOut(RecordSaleOut),
    ReturnSaleStock(ReturnSaleStock),
    Adjust(AdjustFinishedGoodStock),
    Delete(DeleteFinishedGood),
}

/// Event: FinishedGoodCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedGoodCreated {
    pub finished_good_id: FinishedGoodId,
    pub name: String,
    pub recipe_id: RecipeId,
    pub margin_percent: Decimal,
    pub status: FinishedGoodStatus,
    pub category: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FinishedGoodUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedGoodUpdated {
    pub finished_good_id: FinishedGoodId,
    pub name: String,
    pub recipe_id: RecipeId,
    pub margin_percent: Decimal,
    pub category: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FinishedGoodStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedGoodStatusChanged {
    pub finished_good_id: FinishedGoodId,
    pub status: FinishedGoodStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsStockRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsStockRecorded {
    pub finished_good_id: FinishedGoodId,
    pub entry: FinishedGoodStockEntry,
}

/// Event: FinishedGoodDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedGoodDeleted {
    pub finished_good_id: FinishedGoodId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishedGoodEvent {
    FinishedGoodCreated(FinishedGoodCreated),
    FinishedGoodUpdated(FinishedGoodUpdated),
    FinishedGoodStatusChanged(FinishedGoodStatusChanged),
    GoodsStockRecorded(GoodsStockRecorded),
    FinishedGoodDeleted(FinishedGoodDeleted),
}

impl Event for FinishedGoodEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FinishedGoodEvent::FinishedGoodCreated(_) => "goods.finished_good.created",
            FinishedGoodEvent::FinishedGoodUpdated(_) => "goods.finished_good.updated",
            FinishedGoodEvent::FinishedGoodStatusChanged(_) => "goods.finished_good.status_changed",
            FinishedGoodEvent::GoodsStockRecorded(_) => "goods.finished_good.stock_recorded",
            FinishedGoodEvent::FinishedGoodDeleted(_) => "goods.finished_good.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FinishedGoodEvent::FinishedGoodCreated(e) => e.occurred_at,
            FinishedGoodEvent::FinishedGoodUpdated(e) => e.occurred_at,
            FinishedGoodEvent::FinishedGoodStatusChanged(e) => e.occurred_at,
            FinishedGoodEvent::GoodsStockRecorded(e) => e.entry.recorded_at,
            FinishedGoodEvent::FinishedGoodDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for FinishedGood {
    type Command = FinishedGoodCommand;
    type Event = FinishedGoodEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            FinishedGoodEvent::FinishedGoodCreated(e) => {
                self.id = e.finished_good_id;
                self.name = e.name.clone();
                self.recipe_id = Some(e.recipe_id);
                self.margin_percent = e.margin_percent;
                self.status = e.status;
                self.category = e.category.clone();
                self.description = e.description.clone();
                self.created = true;
            }
            FinishedGoodEvent::FinishedGoodUpdated(e) => {
                self.name = e.name.clone();
                self.recipe_id = Some(e.recipe_id);
                self.margin_percent = e.margin_percent;
                self.category = e.category.clone();
                self.description = e.description.clone();
            }
            FinishedGoodEvent::FinishedGoodStatusChanged(e) => {
                self.status = e.status;
            }
            FinishedGoodEvent::GoodsStockRecorded(e) => {
                self.entries.push(e.entry.clone());
            }
            FinishedGoodEvent::FinishedGoodDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FinishedGoodCommand::Create(cmd) => self.handle_create(cmd),
            FinishedGoodCommand::Update(cmd) => self.handle_update(cmd),
            FinishedGoodCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            FinishedGoodCommand::RecordProduction(cmd) => self.handle_production(cmd),
            FinishedGoodCommand::RecordSaleOut(cmd) => self.handle_sale_out(cmd),
            FinishedGoodCommand::ReturnSaleStock(cmd) => self.handle_return(cmd),
            FinishedGoodCommand::Adjust(cmd) => self.handle_adjust(cmd),
            FinishedGoodCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

fn validate_details(name: &str, margin_percent: Decimal) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if margin_percent < Decimal::ZERO {
        return Err(DomainError::validation("margin cannot be negative"));
    }
    Ok(())
}

fn positive(quantity: Decimal, what: &str) -> Result<(), DomainError> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::invalid_quantity(format!(
            "{what} quantity must be positive"
        )));
    }
    Ok(())
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl FinishedGood {
    fn ensure_exists(&self, finished_good_id: FinishedGoodId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.id != finished_good_id {
            return Err(DomainError::invariant("finished_good_id mismatch"));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(DomainError::not_active(format!(
                "finished good '{}' is {:?}",
                self.name, self.status
            )));
        }
        Ok(())
    }

    fn ensure_room(&self, incoming: Decimal) -> Result<(), DomainError> {
        if self.available_quantity().checked_add(incoming).is_none() {
            return Err(DomainError::invalid_quantity(
                "stock quantity exceeds the supported range",
            ));
        }
        Ok(())
    }

    fn ensure_available(&self, requested: Decimal) -> Result<(), DomainError> {
        let available = self.available_quantity();
        if requested > available {
            return Err(DomainError::insufficient_stock(available, requested));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreateFinishedGood,
    ) -> Result<Vec<FinishedGoodEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("finished good already exists"));
        }
        validate_details(&cmd.name, cmd.margin_percent)?;

        Ok(vec![FinishedGoodEvent::FinishedGoodCreated(
            FinishedGoodCreated {
                finished_good_id: cmd.finished_good_id,
                name: cmd.name.trim().to_string(),
                recipe_id: cmd.recipe_id,
                margin_percent: cmd.margin_percent,
                status: cmd.status,
                category: trimmed(&cmd.category),
                description: trimmed(&cmd.description),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_update(
        &self,
        cmd: &UpdateFinishedGood,
    ) -> Result<Vec<FinishedGoodEvent>, DomainError> {
        self.ensure_exists(cmd.finished_good_id)?;
        validate_details(&cmd.name, cmd.margin_percent)?;

        Ok(vec![FinishedGoodEvent::FinishedGoodUpdated(
            FinishedGoodUpdated {
                finished_good_id: cmd.finished_good_id,
                name: cmd.name.trim().to_string(),
                recipe_id: cmd.recipe_id,
                margin_percent: cmd.margin_percent,
                category: trimmed(&cmd.category),
                description: trimmed(&cmd.description),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_change_status(
        &self,
        cmd: &ChangeFinishedGoodStatus,
    ) -> Result<Vec<FinishedGoodEvent>, DomainError> {
        self.ensure_exists(cmd.finished_good_id)?;
        if self.status == cmd.status {
            return Ok(vec![]);
        }

        Ok(vec![FinishedGoodEvent::FinishedGoodStatusChanged(
            FinishedGoodStatusChanged {
                finished_good_id: cmd.finished_good_id,
                status: cmd.status,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_production(
        &self,
        cmd: &RecordProduction,
    ) -> Result<Vec<FinishedGoodEvent>, DomainError> {
        self.ensure_exists(cmd.finished_good_id)?;
        self.ensure_active()?;
        positive(cmd.quantity, "produced")?;
        self.ensure_room(cmd.quantity)?;

        Ok(vec![self.record(FinishedGoodStockEntry {
            entry_id: cmd.entry_id,
            kind: MovementKind::In,
            quantity: cmd.quantity,
            recorded_at: cmd.produced_at,
            source: GoodsEntrySource::Production,
        })])
    }

    fn handle_sale_out(&self, cmd: &RecordSaleOut) -> Result<Vec<FinishedGoodEvent>, DomainError> {
        self.ensure_exists(cmd.finished_good_id)?;
        self.ensure_active()?;
        positive(cmd.quantity, "sold")?;
        self.ensure_available(cmd.quantity)?;

        Ok(vec![self.record(FinishedGoodStockEntry {
            entry_id: cmd.entry_id,
            kind: MovementKind::Out,
            quantity: cmd.quantity,
            recorded_at: cmd.sold_at,
            source: GoodsEntrySource::Sale {
                sale_id: cmd.sale_id,
            },
        })])
    }

    fn handle_return(&self, cmd: &ReturnSaleStock) -> Result<Vec<FinishedGoodEvent>, DomainError> {
        self.ensure_exists(cmd.finished_good_id)?;
        positive(cmd.quantity, "returned")?;
        self.ensure_room(cmd.quantity)?;

        Ok(vec![self.record(FinishedGoodStockEntry {
            entry_id: cmd.entry_id,
            kind: MovementKind::In,
            quantity: cmd.quantity,
            recorded_at: cmd.occurred_at,
            source: GoodsEntrySource::SaleVoided {
                sale_id: cmd.sale_id,
            },
        })])
    }

    fn handle_adjust(
        &self,
        cmd: &AdjustFinishedGoodStock,
    ) -> Result<Vec<FinishedGoodEvent>, DomainError> {
        self.ensure_exists(cmd.finished_good_id)?;
        positive(cmd.quantity, "adjusted")?;
        match cmd.kind {
            MovementKind::Out => self.ensure_available(cmd.quantity)?,
            MovementKind::In => self.ensure_room(cmd.quantity)?,
        }

        Ok(vec![self.record(FinishedGoodStockEntry {
            entry_id: cmd.entry_id,
            kind: cmd.kind,
            quantity: cmd.quantity,
            recorded_at: cmd.occurred_at,
            source: GoodsEntrySource::Adjustment { reason: cmd.reason },
        })])
    }

    fn handle_delete(
        &self,
        cmd: &DeleteFinishedGood,
    ) -> Result<Vec<FinishedGoodEvent>, DomainError> {
        self.ensure_exists(cmd.finished_good_id)?;
        Ok(vec![FinishedGoodEvent::FinishedGoodDeleted(
            FinishedGoodDeleted {
                finished_good_id: cmd.finished_good_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn record(&self, entry: FinishedGoodStockEntry) -> FinishedGoodEvent {
        FinishedGoodEvent::GoodsStockRecorded(GoodsStockRecorded {
            finished_good_id: self.id,
            entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created(status: FinishedGoodStatus) -> FinishedGood {
        let id = FinishedGoodId::generate();
        let mut good = FinishedGood::empty(id);
        let events = good
            .handle(&FinishedGoodCommand::Create(CreateFinishedGood {
                finished_good_id: id,
                name: "Pop".to_string(),
                recipe_id: RecipeId::generate(),
                margin_percent: dec!(50),
                status,
                category: Some(" frozen ".to_string()),
                description: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            good.apply(e);
        }
        good
    }

    fn execute(
        good: &mut FinishedGood,
        build: impl FnOnce(&FinishedGood) -> FinishedGoodCommand,
    ) -> Result<(), DomainError> {
        let cmd = build(good);
        for e in good.handle(&cmd)? {
            good.apply(&e);
        }
        Ok(())
    }

    fn produce(good: &FinishedGood, quantity: Decimal) -> FinishedGoodCommand {
        FinishedGoodCommand::RecordProduction(RecordProduction {
            finished_good_id: good.id_typed(),
            entry_id: Uuid::now_v7(),
            quantity,
            produced_at: test_time(),
        })
    }

    fn sell(good: &FinishedGood, quantity: Decimal) -> FinishedGoodCommand {
        FinishedGoodCommand::RecordSaleOut(RecordSaleOut {
            finished_good_id: good.id_typed(),
            entry_id: Uuid::now_v7(),
            sale_id: AggregateId::new(),
            quantity,
            sold_at: test_time(),
        })
    }

    #[test]
    fn create_trims_optional_text() {
        let good = created(FinishedGoodStatus::Active);
        assert_eq!(good.category(), Some("frozen"));
        assert_eq!(good.description(), None);
        assert!(good.recipe_id().is_some());
    }

    #[test]
    fn create_rejects_negative_margin() {
        let id = FinishedGoodId::generate();
        let err = FinishedGood::empty(id)
            .handle(&FinishedGoodCommand::Create(CreateFinishedGood {
                finished_good_id: id,
                name: "Pop".to_string(),
                recipe_id: RecipeId::generate(),
                margin_percent: dec!(-1),
                status: FinishedGoodStatus::Active,
                category: None,
                description: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn produce_then_sell_leaves_remainder() {
        let mut good = created(FinishedGoodStatus::Active);
        execute(&mut good, |x| produce(x, dec!(10))).unwrap();
        execute(&mut good, |x| sell(x, dec!(4))).unwrap();
        assert_eq!(good.available_quantity(), dec!(6));
    }

    #[test]
    fn oversell_is_rejected() {
        let mut good = created(FinishedGoodStatus::Active);
        execute(&mut good, |x| produce(x, dec!(3))).unwrap();
        let err = good.handle(&sell(&good, dec!(5))).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(dec!(3), dec!(5)));
    }

    #[test]
    fn inactive_and_trial_goods_cannot_be_produced() {
        for status in [FinishedGoodStatus::Inactive, FinishedGoodStatus::Trial] {
            let good = created(status);
            let err = good.handle(&produce(&good, dec!(1))).unwrap_err();
            assert!(matches!(err, DomainError::NotActive(_)));
        }
    }

    #[test]
    fn zero_quantity_production_is_rejected() {
        let good = created(FinishedGoodStatus::Active);
        let err = good.handle(&produce(&good, Decimal::ZERO)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn production_beyond_decimal_range_is_rejected() {
        let mut good = created(FinishedGoodStatus::Active);
        execute(&mut good, |x| produce(x, Decimal::MAX)).unwrap();

        let err = good.handle(&produce(&good, dec!(1))).unwrap_err();

        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn returned_sale_stock_is_available_again() {
        let mut good = created(FinishedGoodStatus::Active);
        execute(&mut good, |x| produce(x, dec!(5))).unwrap();
        execute(&mut good, |x| sell(x, dec!(5))).unwrap();
        execute(&mut good, |x| {
            FinishedGoodCommand::ChangeStatus(ChangeFinishedGoodStatus {
                finished_good_id: x.id_typed(),
                status: FinishedGoodStatus::Inactive,
                occurred_at: test_time(),
            })
        })
        .unwrap();
        execute(&mut good, |x| {
            FinishedGoodCommand::ReturnSaleStock(ReturnSaleStock {
                finished_good_id: x.id_typed(),
                entry_id: Uuid::now_v7(),
                sale_id: AggregateId::new(),
                quantity: dec!(5),
                occurred_at: test_time(),
            })
        })
        .unwrap();
        assert_eq!(good.available_quantity(), dec!(5));
    }

    #[test]
    fn out_adjustment_cannot_oversell() {
        let mut good = created(FinishedGoodStatus::Active);
        execute(&mut good, |x| produce(x, dec!(2))).unwrap();
        let err = good
            .handle(&FinishedGoodCommand::Adjust(AdjustFinishedGoodStock {
                finished_good_id: good.id_typed(),
                entry_id: Uuid::now_v7(),
                kind: MovementKind::Out,
                quantity: dec!(3),
                reason: AdjustmentReason::Damage,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
    }

    #[test]
    fn unchanged_status_emits_nothing() {
        let good = created(FinishedGoodStatus::Active);
        let events = good
            .handle(&FinishedGoodCommand::ChangeStatus(ChangeFinishedGoodStatus {
                finished_good_id: good.id_typed(),
                status: FinishedGoodStatus::Active,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: accepted sales never drive available quantity negative.
            #[test]
            fn sales_never_oversell(
                produced in 0i64..=100,
                sales in prop::collection::vec(1i64..=40, 0..10)
            ) {
                let mut good = created(FinishedGoodStatus::Active);
                if produced > 0 {
                    execute(&mut good, |x| produce(x, Decimal::from(produced))).unwrap();
                }
                for q in sales {
                    let before = good.available_quantity();
                    match execute(&mut good, |x| sell(x, Decimal::from(q))) {
                        Ok(()) => prop_assert_eq!(good.available_quantity(), before - Decimal::from(q)),
                        Err(DomainError::InsufficientStock { .. }) => {
                            prop_assert!(Decimal::from(q) > before);
                            prop_assert_eq!(good.available_quantity(), before);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                    }
                    prop_assert!(good.available_quantity() >= Decimal::ZERO);
                }
            }
        }
    }
}
