//! The costing engine: transactional entry points and derived reads over
//! the raw material, recipe, finished good and sale ledgers.
//!
//! Every read re-fetches the streams it needs and re-derives valuation,
//! rollup and pricing on the spot; nothing derived is stored.

mod catalog;
mod error;
mod production;
mod sale;
mod stock;
mod views;

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use costbook_core::{Aggregate, AggregateId, DomainError};
use costbook_events::{EventBus, EventEnvelope};
use costbook_goods::{FinishedGood, FinishedGoodId, Pricing, price};
use costbook_materials::{RawMaterial, RawMaterialId};
use costbook_recipes::{Recipe, RecipeCost, RecipeId, rollup};
use costbook_sales::{Sale, SaleId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, Loaded};
use crate::config::EngineConfig;
use crate::event_store::{
    ConfiguredEventStore, EventStore, EventStoreError, StoredEvent, TimeoutEventStore,
};

pub use catalog::{FinishedGoodDetails, NewFinishedGood};
pub use error::EngineError;
pub use production::{ProductionReport, RawMaterialShortfall};
pub use views::{
    FinishedGoodView, RawMaterialView, RecipeView, SaleView, StockAlert, StockAlertLevel,
};

pub(crate) use error::AttemptError;

/// Inventory costing and pricing engine.
#[derive(Debug)]
pub struct CostingEngine<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    config: EngineConfig,
}

impl<S, B> CostingEngine<S, B> {
    pub fn new(store: S, bus: B, config: EngineConfig) -> Self {
        let dispatcher = CommandDispatcher::new(store, bus).with_max_attempts(config.max_attempts);
        Self { dispatcher, config }
    }

    /// Engine whose store calls are bounded by `config.store_timeout`.
    pub fn with_store_timeout(
        store: S,
        bus: B,
        config: EngineConfig,
    ) -> CostingEngine<TimeoutEventStore<S>, B> {
        let timeout = config.store_timeout;
        CostingEngine::new(TimeoutEventStore::new(store, timeout), bus, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }
}

impl<B> CostingEngine<TimeoutEventStore<ConfiguredEventStore>, B> {
    /// Engine over the store `config` selects, with store calls bounded by
    /// `config.store_timeout`.
    pub async fn from_config(config: EngineConfig, bus: B) -> Result<Self, EventStoreError> {
        let store = ConfiguredEventStore::from_config(&config).await?;
        Ok(CostingEngine::with_store_timeout(store, bus, config))
    }
}

pub(crate) fn empty_raw_material(id: AggregateId) -> RawMaterial {
    RawMaterial::empty(RawMaterialId::new(id))
}

pub(crate) fn empty_recipe(id: AggregateId) -> Recipe {
    Recipe::empty(RecipeId::new(id))
}

pub(crate) fn empty_finished_good(id: AggregateId) -> FinishedGood {
    FinishedGood::empty(FinishedGoodId::new(id))
}

pub(crate) fn empty_sale(id: AggregateId) -> Sale {
    Sale::empty(SaleId::new(id))
}

impl<S, B> CostingEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run a single-aggregate command, naming the entity in a not-found error.
    pub(crate) async fn execute<A>(
        &self,
        entity: &'static str,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, EngineError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: costbook_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        self.dispatcher
            .dispatch(aggregate_id, aggregate_type, command, make_aggregate)
            .await
            .map_err(|err| match err {
                DispatchError::Domain(DomainError::NotFound) => {
                    EngineError::not_found(entity, aggregate_id)
                }
                other => other.into(),
            })
    }

    pub(crate) async fn load_raw_material(
        &self,
        id: RawMaterialId,
    ) -> Result<Loaded<RawMaterial>, EngineError> {
        let loaded = self
            .dispatcher
            .load(id.aggregate_id(), empty_raw_material)
            .await?;
        if !loaded.aggregate.exists() {
            return Err(EngineError::not_found("raw material", id));
        }
        Ok(loaded)
    }

    pub(crate) async fn load_recipe(&self, id: RecipeId) -> Result<Loaded<Recipe>, EngineError> {
        let loaded = self.dispatcher.load(id.aggregate_id(), empty_recipe).await?;
        if !loaded.aggregate.exists() {
            return Err(EngineError::not_found("recipe", id));
        }
        Ok(loaded)
    }

    pub(crate) async fn load_finished_good(
        &self,
        id: FinishedGoodId,
    ) -> Result<Loaded<FinishedGood>, EngineError> {
        let loaded = self
            .dispatcher
            .load(id.aggregate_id(), empty_finished_good)
            .await?;
        if !loaded.aggregate.exists() {
            return Err(EngineError::not_found("finished good", id));
        }
        Ok(loaded)
    }

    pub(crate) async fn load_sale(&self, id: SaleId) -> Result<Loaded<Sale>, EngineError> {
        let loaded = self.dispatcher.load(id.aggregate_id(), empty_sale).await?;
        if !loaded.aggregate.exists() {
            return Err(EngineError::not_found("sale", id));
        }
        Ok(loaded)
    }

    /// Current unit cost of each listed raw material that still exists.
    ///
    /// Deleted or unknown materials are left out, which the rollup reports
    /// as unresolved.
    pub(crate) async fn raw_material_costs(
        &self,
        ids: impl IntoIterator<Item = RawMaterialId>,
    ) -> Result<HashMap<RawMaterialId, Decimal>, EngineError> {
        let mut costs = HashMap::new();
        for id in ids {
            if costs.contains_key(&id) {
                continue;
            }
            let loaded = self
                .dispatcher
                .load(id.aggregate_id(), empty_raw_material)
                .await?;
            if loaded.aggregate.exists() {
                costs.insert(id, loaded.aggregate.unit_cost());
            }
        }
        Ok(costs)
    }

    pub(crate) async fn recipe_cost(&self, recipe: &Recipe) -> Result<RecipeCost, EngineError> {
        let costs = self
            .raw_material_costs(recipe.lines().iter().map(|l| l.raw_material_id))
            .await?;
        Ok(rollup(recipe, &costs))
    }

    /// Rollup and pricing of a finished good; unresolved pricing when its
    /// recipe is gone.
    pub(crate) async fn finished_good_pricing(
        &self,
        good: &FinishedGood,
    ) -> Result<(Option<RecipeCost>, Pricing), EngineError> {
        let Some(recipe_id) = good.recipe_id() else {
            return Ok((None, Pricing::unresolved()));
        };
        let recipe = self.dispatcher.load(recipe_id.aggregate_id(), empty_recipe).await?;
        if !recipe.aggregate.exists() {
            tracing::debug!(%recipe_id, finished_good = good.name(), "recipe unresolved, pricing at zero");
            return Ok((None, Pricing::unresolved()));
        }

        let cost = self.recipe_cost(&recipe.aggregate).await?;
        let pricing = price(cost.unit_cost, good.margin_percent())?;
        Ok((Some(cost), pricing))
    }
}
