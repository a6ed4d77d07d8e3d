//! Integration tests for the costing engine over the in-memory store.
//!
//! Command → EventStore → EventBus → Projection, plus the multi-stream
//! production and sale units and their concurrency behaviour.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use costbook_core::{AggregateId, ExpectedVersion};
use costbook_events::{EventBus, EventEnvelope, InMemoryEventBus};
use costbook_goods::{FinishedGoodId, FinishedGoodStatus, GoodsEntrySource};
use costbook_ledger::MovementKind;
use costbook_materials::{AdjustmentReason, RawMaterialId, UnitOfMeasure};
use costbook_recipes::{RecipeId, RecipeLine};
use costbook_sales::CostTiming;

use crate::config::EngineConfig;
use crate::engine::{CostingEngine, EngineError, NewFinishedGood, StockAlertLevel};
use crate::event_store::{
    EventStore, EventStoreError, InMemoryEventStore, StoredEvent, StreamAppend,
};
use crate::projections::{StockItemKind, StockLevelsProjection};
use crate::read_model::InMemoryReadModelStore;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn engine_with(
    store: Arc<InMemoryEventStore>,
    config: EngineConfig,
) -> (CostingEngine<Arc<InMemoryEventStore>, Bus>, Bus) {
    costbook_observability::init();
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    (CostingEngine::new(store, bus.clone(), config), bus)
}

fn setup() -> (CostingEngine<Arc<InMemoryEventStore>, Bus>, Arc<InMemoryEventStore>) {
    let store = Arc::new(InMemoryEventStore::new());
    let (engine, _bus) = engine_with(store.clone(), EngineConfig::default());
    (engine, store)
}

fn march(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap()
}

struct Pop {
    milk: RawMaterialId,
    recipe: RecipeId,
    good: FinishedGoodId,
}

/// Milk bought 1000g for 5 and 500g for 3; "Base" uses 200g per batch of
/// 10; "Pop" marks it up 50%.
async fn seed_pop<S, B>(engine: &CostingEngine<S, B>, purchases: &[(Decimal, Decimal)]) -> Pop
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let milk = engine
        .create_raw_material("Milk", UnitOfMeasure::Grams, None)
        .await
        .unwrap();
    for (i, (quantity, cost)) in purchases.iter().enumerate() {
        engine
            .register_purchase(milk, *quantity, *cost, march(1 + i as u32), Some("Dairy Co".into()))
            .await
            .unwrap();
    }
    let recipe = engine
        .create_recipe("Base", dec!(10), vec![RecipeLine::new(milk, dec!(200))])
        .await
        .unwrap();
    let good = engine
        .create_finished_good(NewFinishedGood {
            name: "Pop".to_string(),
            recipe_id: recipe,
            margin_percent: dec!(50),
            status: FinishedGoodStatus::Active,
            category: Some("frozen".to_string()),
            description: None,
        })
        .await
        .unwrap();
    Pop { milk, recipe, good }
}

fn milk_purchases() -> [(Decimal, Decimal); 2] {
    [(dec!(1000), dec!(5)), (dec!(500), dec!(3))]
}

#[tokio::test]
async fn milk_base_pop_costing() {
    let (engine, _) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;

    let milk = engine.raw_material(pop.milk).await.unwrap();
    assert_eq!(milk.valuation.unit_cost, dec!(8) / dec!(1500));
    assert_eq!(milk.valuation.standard_unit_price.round_dp(4), dec!(5.3333));
    assert_eq!(milk.on_hand, dec!(1500));

    let recipe = engine.recompute_recipe(pop.recipe).await.unwrap();
    assert!(recipe.cost.is_complete());
    assert_eq!(recipe.cost.unit_cost.round_dp(4), dec!(0.1067));

    let good = engine.recompute_finished_good(pop.good).await.unwrap();
    assert_eq!(good.pricing.suggested_price.round_dp(3), dec!(0.160));
    assert_eq!(good.pricing.unit_profit.round_dp(4), dec!(0.0533));
    assert_eq!(good.pricing.real_margin.round_dp(1), dec!(33.3));
    assert_eq!(good.category.as_deref(), Some("frozen"));
}

#[tokio::test]
async fn engine_from_default_config_runs_in_memory() {
    costbook_observability::init();
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let engine = CostingEngine::from_config(EngineConfig::default(), bus)
        .await
        .unwrap();
    assert!(!engine.dispatcher().store().inner().is_persistent());

    let pop = seed_pop(&engine, &milk_purchases()).await;
    assert_eq!(engine.raw_material(pop.milk).await.unwrap().on_hand, dec!(1500));
}

#[tokio::test]
async fn produce_ten_then_sell_four_leaves_six() {
    let (engine, _) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;

    let report = engine
        .register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap();
    assert_eq!(report.batches, dec!(1));
    assert_eq!(report.consumptions.len(), 1);
    assert_eq!(report.consumptions[0].quantity, dec!(200));
    assert!(report.shortfalls.is_empty());

    let sale = engine
        .register_sale(pop.good, march(11), dec!(4), dec!(0.25), dec!(0))
        .await
        .unwrap();
    assert_eq!(sale.figures.gross_total, dec!(1.00));

    let good = engine.recompute_finished_good(pop.good).await.unwrap();
    assert_eq!(good.available_quantity, dec!(6));

    let milk = engine.raw_material(pop.milk).await.unwrap();
    assert_eq!(milk.on_hand, dec!(1300));
    // Consumption never moves the weighted average.
    assert_eq!(milk.valuation.unit_cost, dec!(8) / dec!(1500));
    assert_eq!(
        milk.entries.last().and_then(|e| e.provenance()).as_deref(),
        Some("production: Pop (10 units)")
    );
}

#[tokio::test]
async fn whole_batches_consume_exact_multiples() {
    let (engine, _) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;

    let report = engine
        .register_production(pop.good, dec!(30), march(10))
        .await
        .unwrap();
    assert_eq!(report.batches, dec!(3));
    assert_eq!(report.consumptions[0].quantity, dec!(600));
    assert_eq!(engine.raw_material(pop.milk).await.unwrap().on_hand, dec!(900));
}

#[tokio::test]
async fn oversell_is_rejected_and_writes_nothing() {
    let (engine, store) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;
    engine
        .register_production(pop.good, dec!(3), march(10))
        .await
        .unwrap();

    let events_before = store.event_count();
    let err = engine
        .register_sale(pop.good, march(11), dec!(5), dec!(0.25), dec!(0))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::InsufficientFinishedGoodStock { available, requested }
            if available == dec!(3) && requested == dec!(5)
    ));
    assert_eq!(store.event_count(), events_before);
    assert!(engine.list_sales().await.unwrap().is_empty());
    assert_eq!(
        engine.recompute_finished_good(pop.good).await.unwrap().available_quantity,
        dec!(3)
    );
}

#[tokio::test]
async fn invalid_sale_inputs_are_rejected() {
    let (engine, _) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;
    engine
        .register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap();

    let zero = engine
        .register_sale(pop.good, march(11), dec!(0), dec!(1), dec!(0))
        .await
        .unwrap_err();
    assert!(matches!(zero, EngineError::InvalidQuantity(_)));

    let negative_discount = engine
        .register_sale(pop.good, march(11), dec!(1), dec!(1), dec!(-1))
        .await
        .unwrap_err();
    assert!(matches!(negative_discount, EngineError::Validation(_)));
}

#[tokio::test]
async fn production_rejects_quantities_beyond_decimal_range() {
    let (engine, store) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;

    let events_before = store.event_count();
    let err = engine
        .register_production(pop.good, Decimal::MAX / dec!(2), march(10))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidQuantity(_)));
    assert_eq!(store.event_count(), events_before);
    assert_eq!(engine.raw_material(pop.milk).await.unwrap().on_hand, dec!(1500));
}

#[tokio::test]
async fn sale_rejects_amounts_beyond_decimal_range() {
    let (engine, store) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;
    engine
        .register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap();

    let events_before = store.event_count();
    let err = engine
        .register_sale(pop.good, march(11), dec!(4), Decimal::MAX / dec!(2), dec!(0))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidQuantity(_)));
    assert_eq!(store.event_count(), events_before);
    assert!(engine.list_sales().await.unwrap().is_empty());
}

#[tokio::test]
async fn production_shortfall_clamps_stock_but_keeps_full_ledger_entry() {
    let (engine, _) = setup();
    let pop = seed_pop(&engine, &[(dec!(100), dec!(1))]).await;

    let report = engine
        .register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap();

    assert_eq!(report.shortfalls.len(), 1);
    let shortfall = &report.shortfalls[0];
    assert_eq!(shortfall.on_hand, dec!(100));
    assert_eq!(shortfall.consumed, dec!(200));
    assert_eq!(shortfall.shortfall, dec!(100));

    let milk = engine.raw_material(pop.milk).await.unwrap();
    assert_eq!(milk.on_hand, dec!(0));
    assert_eq!(milk.ledger_quantity, dec!(-100));
    assert_eq!(milk.entries.last().map(|e| e.quantity), Some(dec!(-200)));

    // The finished good is still produced.
    assert_eq!(
        engine.recompute_finished_good(pop.good).await.unwrap().available_quantity,
        dec!(10)
    );
}

#[tokio::test]
async fn inactive_goods_cannot_be_produced_or_sold() {
    let (engine, store) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;
    engine
        .change_finished_good_status(pop.good, FinishedGoodStatus::Trial)
        .await
        .unwrap();

    let events_before = store.event_count();
    let produce = engine
        .register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap_err();
    let sell = engine
        .register_sale(pop.good, march(10), dec!(1), dec!(1), dec!(0))
        .await
        .unwrap_err();

    assert!(matches!(produce, EngineError::NotActive(_)));
    assert!(matches!(sell, EngineError::NotActive(_)));
    assert_eq!(store.event_count(), events_before);
}

#[tokio::test]
async fn unknown_entities_report_not_found() {
    let (engine, _) = setup();

    let err = engine
        .register_purchase(RawMaterialId::generate(), dec!(1), dec!(1), march(1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: "raw material", .. }));

    let err = engine
        .register_production(FinishedGoodId::generate(), dec!(1), march(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: "finished good", .. }));
}

#[tokio::test]
async fn deleted_ingredient_is_reported_and_costed_at_zero() {
    let (engine, _) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;
    let sugar = engine
        .create_raw_material("Sugar", UnitOfMeasure::Grams, None)
        .await
        .unwrap();
    engine
        .register_purchase(sugar, dec!(1000), dec!(4), march(2), None)
        .await
        .unwrap();
    engine
        .add_recipe_line(pop.recipe, RecipeLine::new(sugar, dec!(50)))
        .await
        .unwrap();
    engine.delete_raw_material(sugar).await.unwrap();

    let recipe = engine.recompute_recipe(pop.recipe).await.unwrap();
    assert_eq!(recipe.cost.unresolved, vec![sugar]);
    assert_eq!(recipe.cost.unit_cost.round_dp(4), dec!(0.1067));

    let report = engine
        .register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap();
    assert_eq!(report.unresolved, vec![sugar]);
    assert_eq!(report.consumptions.len(), 1);
    assert_eq!(engine.raw_material(pop.milk).await.unwrap().on_hand, dec!(1300));
}

#[tokio::test]
async fn deleted_recipe_prices_good_at_zero() {
    let (engine, _) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;
    engine.delete_recipe(pop.recipe).await.unwrap();

    let good = engine.recompute_finished_good(pop.good).await.unwrap();
    assert!(good.cost.is_none());
    assert_eq!(good.pricing.suggested_price, Decimal::ZERO);

    let err = engine
        .register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: "recipe", .. }));
}

#[tokio::test]
async fn void_sale_returns_stock() {
    let (engine, _) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;
    engine
        .register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap();
    let sale = engine
        .register_sale(pop.good, march(11), dec!(4), dec!(0.25), dec!(0))
        .await
        .unwrap();

    let voided = engine.void_sale(sale.id, "customer returned").await.unwrap();
    assert!(voided.voided);
    assert_eq!(voided.void_reason.as_deref(), Some("customer returned"));

    let good = engine.recompute_finished_good(pop.good).await.unwrap();
    assert_eq!(good.available_quantity, dec!(10));
    let movements: Vec<_> = good.entries.iter().map(|e| (e.kind, e.quantity)).collect();
    assert_eq!(
        movements,
        vec![
            (MovementKind::In, dec!(10)),
            (MovementKind::Out, dec!(4)),
            (MovementKind::In, dec!(4)),
        ]
    );
    assert_eq!(good.entries[0].source, GoodsEntrySource::Production);
    assert_eq!(
        good.entries[1].source,
        GoodsEntrySource::Sale { sale_id: sale.id.aggregate_id() }
    );
    assert_eq!(
        good.entries[2].source,
        GoodsEntrySource::SaleVoided { sale_id: sale.id.aggregate_id() }
    );

    let again = engine.void_sale(sale.id, "twice").await.unwrap_err();
    assert!(matches!(again, EngineError::Conflict(_)));

    assert!(engine.monthly_sales().await.unwrap().is_empty());
    assert_eq!(engine.list_sales().await.unwrap().len(), 1);
}

#[tokio::test]
async fn sales_are_listed_newest_first_and_summarised_by_month() {
    let (engine, _) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;
    engine
        .register_production(pop.good, dec!(20), march(1))
        .await
        .unwrap();

    let april = Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap();
    engine
        .register_sale(pop.good, march(5), dec!(2), dec!(0.25), dec!(0))
        .await
        .unwrap();
    engine
        .register_sale(pop.good, april, dec!(3), dec!(0.25), dec!(0.05))
        .await
        .unwrap();
    engine
        .register_sale(pop.good, march(20), dec!(1), dec!(0.25), dec!(0))
        .await
        .unwrap();

    let sold_at: Vec<_> = engine
        .list_sales()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.sold_at)
        .collect();
    assert_eq!(sold_at, vec![april, march(20), march(5)]);

    let months = engine.monthly_sales().await.unwrap();
    assert_eq!(months.len(), 2);
    assert_eq!((months[0].month, months[0].sale_count, months[0].units), (3, 2, dec!(3)));
    assert_eq!(months[1].net_revenue, dec!(0.70));
}

#[tokio::test]
async fn cost_timing_selects_live_or_captured_cost() {
    let store = Arc::new(InMemoryEventStore::new());
    let (live, _) = engine_with(store.clone(), EngineConfig::default());
    let (frozen, _) = engine_with(
        store.clone(),
        EngineConfig {
            sale_cost_timing: CostTiming::Frozen,
            ..EngineConfig::default()
        },
    );

    let pop = seed_pop(&live, &[(dec!(1000), dec!(5))]).await;
    live.register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap();
    let sale = live
        .register_sale(pop.good, march(11), dec!(1), dec!(1), dec!(0))
        .await
        .unwrap();
    assert_eq!(sale.unit_cost_at_sale, dec!(0.1));

    // Milk gets dearer: average becomes 15/2000.
    live.register_purchase(pop.milk, dec!(1000), dec!(10), march(12), None)
        .await
        .unwrap();

    let live_view = live.sale(sale.id).await.unwrap();
    let frozen_view = frozen.sale(sale.id).await.unwrap();
    assert_eq!(live_view.figures.unit_cost, dec!(0.15));
    assert_eq!(frozen_view.figures.unit_cost, dec!(0.1));
    assert_eq!(frozen_view.figures.total_profit, dec!(0.9));
}

#[tokio::test]
async fn adjustments_cannot_drive_stock_negative() {
    let (engine, _) = setup();
    let pop = seed_pop(&engine, &[(dec!(100), dec!(1))]).await;

    let err = engine
        .adjust_stock(pop.milk, dec!(-150), AdjustmentReason::Damage, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidQuantity(_)));

    let err = engine
        .adjust_stock(pop.milk, dec!(0), AdjustmentReason::Other, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidQuantity(_)));

    let view = engine
        .adjust_stock(pop.milk, dec!(-30), AdjustmentReason::Expiration, Some("sour".into()))
        .await
        .unwrap();
    assert_eq!(view.on_hand, dec!(70));
    // Zero-cost corrections never move the average.
    assert_eq!(view.valuation.unit_cost, dec!(0.01));
    assert_eq!(
        view.entries.last().and_then(|e| e.provenance()).as_deref(),
        Some("adjustment: expiration")
    );

    engine
        .register_production(pop.good, dec!(2), march(10))
        .await
        .unwrap();
    let err = engine
        .adjust_finished_good_stock(pop.good, MovementKind::Out, dec!(3), AdjustmentReason::Theft)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFinishedGoodStock { .. }));

    let available = engine
        .adjust_finished_good_stock(pop.good, MovementKind::In, dec!(1), AdjustmentReason::InventoryCount)
        .await
        .unwrap();
    assert_eq!(available, dec!(3));
}

#[tokio::test]
async fn legacy_valuation_is_used_until_first_purchase() {
    let (engine, _) = setup();
    let flour = engine
        .create_raw_material(
            "Flour",
            UnitOfMeasure::Grams,
            Some(costbook_materials::LegacyValuation {
                total_quantity: dec!(2000),
                total_value: dec!(6),
            }),
        )
        .await
        .unwrap();

    let view = engine.raw_material(flour).await.unwrap();
    assert_eq!(view.valuation.unit_cost, dec!(0.003));
    assert_eq!(view.on_hand, dec!(2000));

    let view = engine
        .register_purchase(flour, dec!(1000), dec!(5), march(3), None)
        .await
        .unwrap();
    assert_eq!(view.valuation.unit_cost, dec!(0.005));
    assert_eq!(view.on_hand, dec!(3000));
}

#[tokio::test]
async fn stock_alerts_use_thresholds() {
    let (engine, _) = setup();
    for (name, quantity) in [("Vanilla", dec!(5)), ("Cocoa", dec!(50)), ("Sugar", dec!(500))] {
        let id = engine
            .create_raw_material(name, UnitOfMeasure::Grams, None)
            .await
            .unwrap();
        engine
            .register_purchase(id, quantity, dec!(1), march(1), None)
            .await
            .unwrap();
    }

    let alerts = engine.stock_alerts().await.unwrap();
    let summary: Vec<_> = alerts.iter().map(|a| (a.name.as_str(), a.level)).collect();
    assert_eq!(
        summary,
        vec![("Vanilla", StockAlertLevel::Critical), ("Cocoa", StockAlertLevel::Low)]
    );

    let names: Vec<_> = engine
        .list_raw_materials()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["Cocoa", "Sugar", "Vanilla"]);
}

#[tokio::test]
async fn projection_tracks_published_stock() {
    let store = Arc::new(InMemoryEventStore::new());
    let (engine, bus) = engine_with(store, EngineConfig::default());
    let subscription = bus.subscribe();
    let projection = StockLevelsProjection::new(InMemoryReadModelStore::new());

    let pop = seed_pop(&engine, &milk_purchases()).await;
    engine
        .register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap();
    engine
        .register_sale(pop.good, march(11), dec!(4), dec!(0.25), dec!(0))
        .await
        .unwrap();

    let envelopes = subscription.drain();
    for envelope in &envelopes {
        projection.apply_envelope(envelope).unwrap();
    }
    // Redelivery is a no-op.
    for envelope in &envelopes {
        projection.apply_envelope(envelope).unwrap();
    }

    let milk = projection.get(&pop.milk.aggregate_id()).unwrap();
    assert_eq!(milk.quantity, dec!(1300));
    let good = projection.get(&pop.good.aggregate_id()).unwrap();
    assert_eq!((good.kind, good.quantity), (StockItemKind::FinishedGood, dec!(6)));
    assert_eq!(good.last_movement_at, Some(march(11)));
}

/// Store that lets a competing writer append to a raw material stream right
/// before the engine's own batch, for the next `races` appends.
struct RacingStore {
    inner: Arc<InMemoryEventStore>,
    races: AtomicU32,
    appends: AtomicU32,
}

impl RacingStore {
    fn new(inner: Arc<InMemoryEventStore>) -> Self {
        Self {
            inner,
            races: AtomicU32::new(0),
            appends: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl EventStore for RacingStore {
    async fn append_atomic(
        &self,
        batch: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.appends.fetch_add(1, Ordering::SeqCst);

        let racing = self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if racing {
            let competing = batch.iter().find(|append| {
                append.events.first().is_some_and(|e| {
                    e.aggregate_type == costbook_materials::raw_material::AGGREGATE_TYPE
                })
            });
            if let Some(append) = competing {
                let events = append
                    .events
                    .iter()
                    .cloned()
                    .map(|mut e| {
                        e.event_id = Uuid::now_v7();
                        e
                    })
                    .collect();
                self.inner.append(events, ExpectedVersion::Any).await?;
            }
        }

        self.inner.append_atomic(batch).await
    }

    async fn load_stream(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_stream(aggregate_id).await
    }

    async fn list_streams(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<AggregateId>, EventStoreError> {
        self.inner.list_streams(aggregate_type).await
    }
}

#[tokio::test]
async fn production_retries_after_concurrent_consumption() {
    costbook_observability::init();
    let racing = Arc::new(RacingStore::new(Arc::new(InMemoryEventStore::new())));
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let engine = CostingEngine::new(racing.clone(), bus, EngineConfig::default());
    let pop = seed_pop(&engine, &milk_purchases()).await;

    racing.races.store(1, Ordering::SeqCst);
    let before = racing.appends.load(Ordering::SeqCst);
    engine
        .register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap();

    assert_eq!(racing.appends.load(Ordering::SeqCst) - before, 2);
    // The competing consumption and the retried one both landed.
    let milk = engine.raw_material(pop.milk).await.unwrap();
    assert_eq!(milk.on_hand, dec!(1100));
    assert_eq!(milk.entries.len(), 4);
    assert_eq!(
        engine.recompute_finished_good(pop.good).await.unwrap().available_quantity,
        dec!(10)
    );
}

#[tokio::test]
async fn production_gives_up_after_max_attempts_without_partial_writes() {
    costbook_observability::init();
    let racing = Arc::new(RacingStore::new(Arc::new(InMemoryEventStore::new())));
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let config = EngineConfig {
        max_attempts: 2,
        ..EngineConfig::default()
    };
    let engine = CostingEngine::new(racing.clone(), bus, config);
    let pop = seed_pop(&engine, &milk_purchases()).await;

    racing.races.store(u32::MAX, Ordering::SeqCst);
    let err = engine
        .register_production(pop.good, dec!(10), march(10))
        .await
        .unwrap_err();
    racing.races.store(0, Ordering::SeqCst);

    assert!(matches!(err, EngineError::Conflict(_)));
    assert!(err.is_retryable());
    // Only the competing writer's consumption is on the ledger.
    assert_eq!(engine.raw_material(pop.milk).await.unwrap().entries.len(), 4);
    assert_eq!(
        engine.recompute_finished_good(pop.good).await.unwrap().available_quantity,
        dec!(0)
    );
}

/// Store whose reads never answer in time.
struct SlowStore(InMemoryEventStore);

#[async_trait]
impl EventStore for SlowStore {
    async fn append_atomic(
        &self,
        batch: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.0.append_atomic(batch).await
    }

    async fn load_stream(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.0.load_stream(aggregate_id).await
    }

    async fn list_streams(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<AggregateId>, EventStoreError> {
        self.0.list_streams(aggregate_type).await
    }
}

#[tokio::test]
async fn store_timeout_surfaces_as_retryable_unavailable() {
    costbook_observability::init();
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let config = EngineConfig {
        store_timeout: Duration::from_millis(20),
        ..EngineConfig::default()
    };
    let engine = CostingEngine::with_store_timeout(SlowStore(InMemoryEventStore::new()), bus, config);

    let err = engine
        .raw_material(RawMaterialId::generate())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::StoreUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn recipe_edits_flow_into_pricing() {
    let (engine, _) = setup();
    let pop = seed_pop(&engine, &milk_purchases()).await;

    let recipe = engine.recompute_recipe(pop.recipe).await.unwrap();
    let line = recipe.lines[0].clone();
    engine
        .update_recipe_line(
            pop.recipe,
            RecipeLine {
                quantity: dec!(400),
                ..line
            },
        )
        .await
        .unwrap();
    engine.update_recipe(pop.recipe, "Base", dec!(20)).await.unwrap();

    let good = engine.recompute_finished_good(pop.good).await.unwrap();
    assert_eq!(good.pricing.unit_cost.round_dp(4), dec!(0.1067));

    engine.replace_recipe_lines(pop.recipe, vec![]).await.unwrap();
    let good = engine.recompute_finished_good(pop.good).await.unwrap();
    assert_eq!(good.pricing.unit_cost, Decimal::ZERO);

    let names: Vec<_> = engine
        .list_finished_goods()
        .await
        .unwrap()
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(names, vec!["Pop"]);
    assert_eq!(engine.list_recipes().await.unwrap().len(), 1);
}
