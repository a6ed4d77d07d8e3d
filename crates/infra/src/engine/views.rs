//! Derived reads. Everything here is recomputed from the ledgers on call.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;

use costbook_events::{EventBus, EventEnvelope};
use costbook_goods::{
    FinishedGood, FinishedGoodId, FinishedGoodStatus, FinishedGoodStockEntry, Pricing,
};
use costbook_ledger::chronological;
use costbook_materials::{RawMaterial, RawMaterialId, StockEntry, UnitOfMeasure, Valuation};
use costbook_recipes::{Recipe, RecipeCost, RecipeId, RecipeLine};
use costbook_sales::{CostTiming, MonthlySummary, Sale, SaleFigures, SaleId, summarize_by_month};

use super::{
    CostingEngine, EngineError, empty_finished_good, empty_raw_material, empty_recipe, empty_sale,
};
use crate::event_store::EventStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMaterialView {
    pub id: RawMaterialId,
    pub name: String,
    pub unit: UnitOfMeasure,
    /// Persisted running total, floored at zero by production.
    pub on_hand: Decimal,
    /// Opening balance plus the signed ledger sum; may be negative.
    pub ledger_quantity: Decimal,
    pub valuation: Valuation,
    /// Ledger rows, oldest first.
    pub entries: Vec<StockEntry>,
}

impl RawMaterialView {
    fn from_aggregate(material: &RawMaterial) -> Self {
        Self {
            id: material.id_typed(),
            name: material.name().to_string(),
            unit: material.unit(),
            on_hand: material.on_hand(),
            ledger_quantity: material.ledger_quantity(),
            valuation: material.valuation(),
            entries: chronological(material.entries()).into_iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeView {
    pub id: RecipeId,
    pub name: String,
    pub batch_yield: Decimal,
    pub lines: Vec<RecipeLine>,
    pub cost: RecipeCost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishedGoodView {
    pub id: FinishedGoodId,
    pub name: String,
    pub recipe_id: Option<RecipeId>,
    pub status: FinishedGoodStatus,
    pub margin_percent: Decimal,
    pub category: Option<String>,
    pub description: Option<String>,
    pub available_quantity: Decimal,
    /// Ledger rows, oldest first.
    pub entries: Vec<FinishedGoodStockEntry>,
    /// `None` when the recipe no longer exists.
    pub cost: Option<RecipeCost>,
    pub pricing: Pricing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleView {
    pub id: SaleId,
    pub finished_good_id: Option<FinishedGoodId>,
    pub sold_at: chrono::DateTime<chrono::Utc>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub unit_cost_at_sale: Decimal,
    pub voided: bool,
    pub void_reason: Option<String>,
    pub cost_timing: CostTiming,
    pub figures: SaleFigures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StockAlertLevel {
    Critical,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAlert {
    pub raw_material_id: RawMaterialId,
    pub name: String,
    pub unit: UnitOfMeasure,
    pub on_hand: Decimal,
    pub level: StockAlertLevel,
}

impl<S, B> CostingEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub async fn raw_material(&self, id: RawMaterialId) -> Result<RawMaterialView, EngineError> {
        let loaded = self.load_raw_material(id).await?;
        Ok(RawMaterialView::from_aggregate(&loaded.aggregate))
    }

    /// Every live raw material, by name.
    pub async fn list_raw_materials(&self) -> Result<Vec<RawMaterialView>, EngineError> {
        let mut views: Vec<_> = self
            .live_raw_materials()
            .await?
            .iter()
            .map(RawMaterialView::from_aggregate)
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(views)
    }

    /// Re-derive a recipe's cost from the current raw material costs.
    pub async fn recompute_recipe(&self, id: RecipeId) -> Result<RecipeView, EngineError> {
        let recipe = self.load_recipe(id).await?;
        self.recipe_view(&recipe.aggregate).await
    }

    pub async fn list_recipes(&self) -> Result<Vec<RecipeView>, EngineError> {
        let recipes = self
            .dispatcher
            .load_all(costbook_recipes::recipe::AGGREGATE_TYPE, empty_recipe)
            .await?;

        let mut views = Vec::new();
        for loaded in recipes.iter().filter(|l| l.aggregate.exists()) {
            views.push(self.recipe_view(&loaded.aggregate).await?);
        }
        views.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(views)
    }

    async fn recipe_view(&self, recipe: &Recipe) -> Result<RecipeView, EngineError> {
        let cost = self.recipe_cost(recipe).await?;
        Ok(RecipeView {
            id: recipe.id_typed(),
            name: recipe.name().to_string(),
            batch_yield: recipe.batch_yield(),
            lines: recipe.lines().to_vec(),
            cost,
        })
    }

    /// Re-derive a finished good's cost and pricing.
    pub async fn recompute_finished_good(
        &self,
        id: FinishedGoodId,
    ) -> Result<FinishedGoodView, EngineError> {
        let good = self.load_finished_good(id).await?;
        self.finished_good_view(&good.aggregate).await
    }

    pub async fn list_finished_goods(&self) -> Result<Vec<FinishedGoodView>, EngineError> {
        let goods = self
            .dispatcher
            .load_all(costbook_goods::finished_good::AGGREGATE_TYPE, empty_finished_good)
            .await?;

        let mut views = Vec::new();
        for loaded in goods.iter().filter(|l| l.aggregate.exists()) {
            views.push(self.finished_good_view(&loaded.aggregate).await?);
        }
        views.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(views)
    }

    async fn finished_good_view(&self, good: &FinishedGood) -> Result<FinishedGoodView, EngineError> {
        let (cost, pricing) = self.finished_good_pricing(good).await?;
        Ok(FinishedGoodView {
            id: good.id_typed(),
            name: good.name().to_string(),
            recipe_id: good.recipe_id(),
            status: good.status(),
            margin_percent: good.margin_percent(),
            category: good.category().map(str::to_string),
            description: good.description().map(str::to_string),
            available_quantity: good.available_quantity(),
            entries: chronological(good.entries()).into_iter().cloned().collect(),
            cost,
            pricing,
        })
    }

    pub async fn sale(&self, id: SaleId) -> Result<SaleView, EngineError> {
        let sale = self.load_sale(id).await?;
        let mut live = HashMap::new();
        let live_cost = self.live_unit_cost(&sale.aggregate, &mut live).await?;
        self.sale_view(&sale.aggregate, live_cost)
    }

    /// Every sale, newest first.
    pub async fn list_sales(&self) -> Result<Vec<SaleView>, EngineError> {
        let sales = self.all_sales().await?;
        let mut live = HashMap::new();

        let mut views = Vec::with_capacity(sales.len());
        for sale in &sales {
            let live_cost = self.live_unit_cost(sale, &mut live).await?;
            views.push(self.sale_view(sale, live_cost)?);
        }
        views.sort_by(|a, b| b.sold_at.cmp(&a.sold_at));
        Ok(views)
    }

    /// Per-month totals of non-voided sales, oldest month first.
    pub async fn monthly_sales(&self) -> Result<Vec<MonthlySummary>, EngineError> {
        let sales = self.all_sales().await?;
        let mut live = HashMap::new();

        let mut figures = Vec::with_capacity(sales.len());
        for sale in &sales {
            let live_cost = self.live_unit_cost(sale, &mut live).await?;
            figures.push(sale.figures(self.config.sale_cost_timing, live_cost)?);
        }
        Ok(summarize_by_month(sales.iter().zip(figures)))
    }

    /// Raw materials at or below the configured thresholds, most urgent first.
    pub async fn stock_alerts(&self) -> Result<Vec<StockAlert>, EngineError> {
        let mut alerts: Vec<StockAlert> = self
            .live_raw_materials()
            .await?
            .iter()
            .filter_map(|material| {
                let on_hand = material.on_hand();
                let level = if on_hand <= self.config.alert_critical {
                    StockAlertLevel::Critical
                } else if on_hand <= self.config.alert_low {
                    StockAlertLevel::Low
                } else {
                    return None;
                };
                Some(StockAlert {
                    raw_material_id: material.id_typed(),
                    name: material.name().to_string(),
                    unit: material.unit(),
                    on_hand,
                    level,
                })
            })
            .collect();
        alerts.sort_by(|a, b| a.on_hand.cmp(&b.on_hand).then_with(|| a.name.cmp(&b.name)));
        Ok(alerts)
    }

    pub(crate) fn sale_view(
        &self,
        sale: &Sale,
        live_unit_cost: Decimal,
    ) -> Result<SaleView, EngineError> {
        let cost_timing = self.config.sale_cost_timing;
        Ok(SaleView {
            id: sale.id_typed(),
            finished_good_id: sale.finished_good_id(),
            sold_at: sale.sold_at(),
            quantity: sale.quantity(),
            unit_price: sale.unit_price(),
            discount: sale.discount(),
            unit_cost_at_sale: sale.unit_cost_at_sale(),
            voided: sale.is_voided(),
            void_reason: sale.void_reason().map(str::to_string),
            cost_timing,
            figures: sale.figures(cost_timing, live_unit_cost)?,
        })
    }

    /// Current unit cost of the sale's finished good, memoized per good for
    /// one read. Falls back to the captured cost once the good is gone.
    async fn live_unit_cost(
        &self,
        sale: &Sale,
        memo: &mut HashMap<FinishedGoodId, Option<Decimal>>,
    ) -> Result<Decimal, EngineError> {
        let Some(good_id) = sale.finished_good_id() else {
            return Ok(sale.unit_cost_at_sale());
        };

        if !memo.contains_key(&good_id) {
            let good = self
                .dispatcher
                .load(good_id.aggregate_id(), empty_finished_good)
                .await?;
            let cost = if good.aggregate.exists() {
                Some(self.finished_good_pricing(&good.aggregate).await?.1.unit_cost)
            } else {
                None
            };
            memo.insert(good_id, cost);
        }

        Ok(memo
            .get(&good_id)
            .copied()
            .flatten()
            .unwrap_or_else(|| sale.unit_cost_at_sale()))
    }

    async fn live_raw_materials(&self) -> Result<Vec<RawMaterial>, EngineError> {
        Ok(self
            .dispatcher
            .load_all(costbook_materials::raw_material::AGGREGATE_TYPE, empty_raw_material)
            .await?
            .into_iter()
            .map(|loaded| loaded.aggregate)
            .filter(RawMaterial::exists)
            .collect())
    }

    async fn all_sales(&self) -> Result<Vec<Sale>, EngineError> {
        Ok(self
            .dispatcher
            .load_all(costbook_sales::sale::AGGREGATE_TYPE, empty_sale)
            .await?
            .into_iter()
            .map(|loaded| loaded.aggregate)
            .filter(Sale::exists)
            .collect())
    }
}
