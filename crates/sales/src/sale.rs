use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use costbook_core::{Aggregate, AggregateRoot, DomainError, DomainResult, typed_id};
use costbook_events::Event;
use costbook_goods::FinishedGoodId;

use crate::figures::{CostTiming, SaleFigures};

/// Stream type for sale event streams.
pub const AGGREGATE_TYPE: &str = "sales.sale";

typed_id!(
    /// Sale identifier.
    SaleId
);

/// Aggregate root: Sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    finished_good_id: Option<FinishedGoodId>,
    sold_at: DateTime<Utc>,
    quantity: Decimal,
    unit_price: Decimal,
    discount: Decimal,
    unit_cost_at_sale: Decimal,
    void_reason: Option<String>,
    voided: bool,
    version: u64,
    created: bool,
}

impl Sale {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            finished_good_id: None,
            sold_at: DateTime::<Utc>::UNIX_EPOCH,
            quantity: Decimal::ZERO,
            unit_price: Decimal::ZERO,
            discount: Decimal::ZERO,
            unit_cost_at_sale: Decimal::ZERO,
            void_reason: None,
            voided: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn finished_good_id(&self) -> Option<FinishedGoodId> {
        self.finished_good_id
    }

    pub fn sold_at(&self) -> DateTime<Utc> {
        self.sold_at
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn discount(&self) -> Decimal {
        self.discount
    }

    pub fn unit_cost_at_sale(&self) -> Decimal {
        self.unit_cost_at_sale
    }

    pub fn is_voided(&self) -> bool {
        self.voided
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    /// Profit figures measured against the unit cost `timing` selects.
    pub fn figures(&self, timing: CostTiming, live_unit_cost: Decimal) -> DomainResult<SaleFigures> {
        SaleFigures::compute(
            self.quantity,
            self.unit_price,
            self.discount,
            timing.select(live_unit_cost, self.unit_cost_at_sale),
        )
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSale {
    pub sale_id: SaleId,
    pub finished_good_id: FinishedGoodId,
    pub sold_at: DateTime<Utc>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub unit_cost_at_sale: Decimal,
}

/// Command: VoidSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidSale {
    pub sale_id: SaleId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    Record(RecordSale),
    Void(VoidSale),
}

/// Event: SaleRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub sale_id: SaleId,
    pub finished_good_id: FinishedGoodId,
    pub sold_at: DateTime<Utc>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub unit_cost_at_sale: Decimal,
}

/// Event: SaleVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleVoided {
    pub sale_id: SaleId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleRecorded(SaleRecorded),
    SaleVoided(SaleVoided),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleRecorded(_) => "sales.sale.recorded",
            SaleEvent::SaleVoided(_) => "sales.sale.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleRecorded(e) => e.sold_at,
            SaleEvent::SaleVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleRecorded(e) => {
                self.id = e.sale_id;
                self.finished_good_id = Some(e.finished_good_id);
                self.sold_at = e.sold_at;
                self.quantity = e.quantity;
                self.unit_price = e.unit_price;
                self.discount = e.discount;
                self.unit_cost_at_sale = e.unit_cost_at_sale;
                self.created = true;
            }
            SaleEvent::SaleVoided(e) => {
                self.voided = true;
                self.void_reason = Some(e.reason.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::Record(cmd) => self.handle_record(cmd),
            SaleCommand::Void(cmd) => self.handle_void(cmd),
        }
    }
}

impl Sale {
    fn handle_record(&self, cmd: &RecordSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already recorded"));
        }
        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::invalid_quantity("sold quantity must be positive"));
        }
        if cmd.unit_price < Decimal::ZERO {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        if cmd.discount < Decimal::ZERO {
            return Err(DomainError::validation("discount cannot be negative"));
        }
        SaleFigures::compute(cmd.quantity, cmd.unit_price, cmd.discount, cmd.unit_cost_at_sale)?;

        Ok(vec![SaleEvent::SaleRecorded(SaleRecorded {
            sale_id: cmd.sale_id,
            finished_good_id: cmd.finished_good_id,
            sold_at: cmd.sold_at,
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
            discount: cmd.discount,
            unit_cost_at_sale: cmd.unit_cost_at_sale,
        })])
    }

    fn handle_void(&self, cmd: &VoidSale) -> Result<Vec<SaleEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != cmd.sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        if self.voided {
            return Err(DomainError::conflict("sale already voided"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("void reason cannot be empty"));
        }

        Ok(vec![SaleEvent::SaleVoided(SaleVoided {
            sale_id: cmd.sale_id,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
