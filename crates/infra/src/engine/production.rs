use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use costbook_core::Aggregate;
use costbook_events::{EventBus, EventEnvelope};
use costbook_goods::{FinishedGoodCommand, FinishedGoodId, RecordProduction};
use costbook_materials::{ConsumeForProduction, RawMaterialCommand, RawMaterialId};
use costbook_recipes::Consumption;

use super::{AttemptError, CostingEngine, EngineError, empty_raw_material};
use crate::command_dispatcher::{UnitOfWork, retry_on_conflict};
use crate::event_store::EventStore;

/// A raw material that did not have enough on hand for a production run.
///
/// The consumption was still recorded in full; the persisted on-hand was
/// floored at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMaterialShortfall {
    pub raw_material_id: RawMaterialId,
    pub name: String,
    pub on_hand: Decimal,
    pub consumed: Decimal,
    pub shortfall: Decimal,
}

/// What a production run wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductionReport {
    pub finished_good_id: FinishedGoodId,
    pub quantity_produced: Decimal,
    pub batches: Decimal,
    /// Consumption recorded per raw material.
    pub consumptions: Vec<Consumption>,
    pub shortfalls: Vec<RawMaterialShortfall>,
    /// Recipe ingredients whose raw material no longer exists; skipped.
    pub unresolved: Vec<RawMaterialId>,
}

impl<S, B> CostingEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Produce `quantity` units of a finished good.
    ///
    /// Consumes `line quantity × batches` of every recipe ingredient and adds
    /// the finished-good stock in one atomic append. A concurrent write to
    /// any of the touched streams discards the whole unit and the run is
    /// retried from fresh reads.
    #[instrument(skip(self), err)]
    pub async fn register_production(
        &self,
        finished_good_id: FinishedGoodId,
        quantity: Decimal,
        produced_at: DateTime<Utc>,
    ) -> Result<ProductionReport, EngineError> {
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidQuantity(
                "production quantity must be positive".to_string(),
            ));
        }

        let report = retry_on_conflict(self.dispatcher.max_attempts(), "register_production", || {
            self.production_attempt(finished_good_id, quantity, produced_at)
        })
        .await?;

        for shortfall in &report.shortfalls {
            warn!(
                raw_material_id = %shortfall.raw_material_id,
                name = %shortfall.name,
                on_hand = %shortfall.on_hand,
                consumed = %shortfall.consumed,
                "production consumed more than on hand, stock floored at zero"
            );
        }
        if !report.unresolved.is_empty() {
            warn!(count = report.unresolved.len(), "production skipped unresolved ingredients");
        }
        info!(
            %finished_good_id,
            %quantity,
            batches = %report.batches,
            "production registered"
        );
        Ok(report)
    }

    async fn production_attempt(
        &self,
        finished_good_id: FinishedGoodId,
        quantity: Decimal,
        produced_at: DateTime<Utc>,
    ) -> Result<ProductionReport, AttemptError> {
        let good = self.load_finished_good(finished_good_id).await?;
        if !good.aggregate.is_active() {
            return Err(EngineError::NotActive(format!(
                "finished good '{}' is {:?}",
                good.aggregate.name(),
                good.aggregate.status()
            ))
            .into());
        }
        let recipe_id = good
            .aggregate
            .recipe_id()
            .ok_or_else(|| EngineError::not_found("recipe", finished_good_id))?;
        let recipe = self.load_recipe(recipe_id).await?;

        let batches = recipe.aggregate.batches_for(quantity)?;
        let mut unit = UnitOfWork::new();
        let mut consumptions = Vec::new();
        let mut shortfalls = Vec::new();
        let mut unresolved = Vec::new();

        for consumption in recipe.aggregate.consumption_for(quantity)? {
            let material = self
                .dispatcher
                .load(consumption.raw_material_id.aggregate_id(), empty_raw_material)
                .await?;
            if !material.aggregate.exists() {
                unresolved.push(consumption.raw_material_id);
                continue;
            }

            if let Some(shortfall) = material.aggregate.shortfall_for(consumption.quantity) {
                shortfalls.push(RawMaterialShortfall {
                    raw_material_id: consumption.raw_material_id,
                    name: material.aggregate.name().to_string(),
                    on_hand: material.aggregate.on_hand(),
                    consumed: consumption.quantity,
                    shortfall,
                });
            }

            let events = material.aggregate.handle(&RawMaterialCommand::ConsumeForProduction(
                ConsumeForProduction {
                    raw_material_id: consumption.raw_material_id,
                    entry_id: Uuid::now_v7(),
                    quantity: consumption.quantity,
                    finished_good_name: good.aggregate.name().to_string(),
                    quantity_produced: quantity,
                    produced_at,
                },
            ))?;
            unit.stage(
                consumption.raw_material_id.aggregate_id(),
                costbook_materials::raw_material::AGGREGATE_TYPE,
                material.version,
                &events,
            )?;
            consumptions.push(consumption);
        }

        let events = good.aggregate.handle(&FinishedGoodCommand::RecordProduction(RecordProduction {
            finished_good_id,
            entry_id: Uuid::now_v7(),
            quantity,
            produced_at,
        }))?;
        unit.stage(
            finished_good_id.aggregate_id(),
            costbook_goods::finished_good::AGGREGATE_TYPE,
            good.version,
            &events,
        )?;

        self.dispatcher.commit(unit).await?;

        Ok(ProductionReport {
            finished_good_id,
            quantity_produced: quantity,
            batches,
            consumptions,
            shortfalls,
            unresolved,
        })
    }
}
