use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::{info, instrument};
use uuid::Uuid;

use costbook_events::{EventBus, EventEnvelope};
use costbook_goods::{AdjustFinishedGoodStock, FinishedGoodCommand, FinishedGoodId};
use costbook_ledger::MovementKind;
use costbook_materials::{
    AdjustRawMaterialStock, AdjustmentReason, RawMaterialCommand, RawMaterialId, RecordPurchase,
};

use super::{CostingEngine, EngineError, RawMaterialView, empty_raw_material};
use crate::event_store::EventStore;

impl<S, B> CostingEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Record an acquisition. The new weighted-average unit cost shows up on
    /// the next read.
    #[instrument(skip(self, supplier), err)]
    pub async fn register_purchase(
        &self,
        raw_material_id: RawMaterialId,
        quantity: Decimal,
        total_cost: Decimal,
        purchased_at: DateTime<Utc>,
        supplier: Option<String>,
    ) -> Result<RawMaterialView, EngineError> {
        let command = RawMaterialCommand::RecordPurchase(RecordPurchase {
            raw_material_id,
            entry_id: Uuid::now_v7(),
            quantity,
            total_cost,
            supplier,
            purchased_at,
        });
        self.execute(
            "raw material",
            raw_material_id.aggregate_id(),
            costbook_materials::raw_material::AGGREGATE_TYPE,
            command,
            empty_raw_material,
        )
        .await?;

        let view = self.raw_material(raw_material_id).await?;
        info!(
            %raw_material_id,
            on_hand = %view.on_hand,
            unit_cost = %view.valuation.unit_cost,
            "purchase recorded"
        );
        Ok(view)
    }

    /// Signed zero-cost correction. A negative adjustment may not take
    /// on-hand below zero.
    #[instrument(skip(self, note), err)]
    pub async fn adjust_stock(
        &self,
        raw_material_id: RawMaterialId,
        quantity: Decimal,
        reason: AdjustmentReason,
        note: Option<String>,
    ) -> Result<RawMaterialView, EngineError> {
        let command = RawMaterialCommand::AdjustStock(AdjustRawMaterialStock {
            raw_material_id,
            entry_id: Uuid::now_v7(),
            quantity,
            reason,
            note,
            occurred_at: Utc::now(),
        });
        self.execute(
            "raw material",
            raw_material_id.aggregate_id(),
            costbook_materials::raw_material::AGGREGATE_TYPE,
            command,
            empty_raw_material,
        )
        .await
        .map_err(|err| match err {
            // Raw material shortfalls are not finished-good stock errors.
            EngineError::InsufficientFinishedGoodStock {
                available,
                requested,
            } => EngineError::InvalidQuantity(format!(
                "adjustment of -{requested} exceeds on-hand {available}"
            )),
            other => other,
        })?;

        let view = self.raw_material(raw_material_id).await?;
        info!(%raw_material_id, %reason, on_hand = %view.on_hand, "stock adjusted");
        Ok(view)
    }

    /// Manual finished-good correction; an `Out` adjustment may not oversell.
    #[instrument(skip(self), err)]
    pub async fn adjust_finished_good_stock(
        &self,
        finished_good_id: FinishedGoodId,
        kind: MovementKind,
        quantity: Decimal,
        reason: AdjustmentReason,
    ) -> Result<Decimal, EngineError> {
        let command = FinishedGoodCommand::Adjust(AdjustFinishedGoodStock {
            finished_good_id,
            entry_id: Uuid::now_v7(),
            kind,
            quantity,
            reason,
            occurred_at: Utc::now(),
        });
        self.finished_good_command(finished_good_id, command).await?;

        let available = self
            .load_finished_good(finished_good_id)
            .await?
            .aggregate
            .available_quantity();
        info!(%finished_good_id, ?kind, %available, "finished good stock adjusted");
        Ok(available)
    }
}
