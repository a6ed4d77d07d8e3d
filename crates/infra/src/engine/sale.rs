use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::{info, instrument};
use uuid::Uuid;

use costbook_core::Aggregate;
use costbook_events::{EventBus, EventEnvelope};
use costbook_goods::{FinishedGoodCommand, FinishedGoodId, RecordSaleOut, ReturnSaleStock};
use costbook_sales::{RecordSale, Sale, SaleCommand, SaleId, VoidSale};

use super::{AttemptError, CostingEngine, EngineError, SaleView};
use crate::command_dispatcher::{UnitOfWork, retry_on_conflict};
use crate::event_store::EventStore;

impl<S, B> CostingEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Sell from finished-good stock.
    ///
    /// Writes the finished-good `Out` entry and the sale record atomically,
    /// capturing the good's current unit cost on the sale. Asking for more
    /// than is available fails with `InsufficientFinishedGoodStock` and
    /// writes nothing.
    #[instrument(skip(self), err)]
    pub async fn register_sale(
        &self,
        finished_good_id: FinishedGoodId,
        sold_at: DateTime<Utc>,
        quantity: Decimal,
        unit_price: Decimal,
        discount: Decimal,
    ) -> Result<SaleView, EngineError> {
        let sale_id = SaleId::generate();

        let sale = retry_on_conflict(self.dispatcher.max_attempts(), "register_sale", || {
            self.sale_attempt(sale_id, finished_good_id, sold_at, quantity, unit_price, discount)
        })
        .await?;

        info!(%sale_id, %finished_good_id, %quantity, "sale registered");
        self.sale_view(&sale, sale.unit_cost_at_sale())
    }

    async fn sale_attempt(
        &self,
        sale_id: SaleId,
        finished_good_id: FinishedGoodId,
        sold_at: DateTime<Utc>,
        quantity: Decimal,
        unit_price: Decimal,
        discount: Decimal,
    ) -> Result<Sale, AttemptError> {
        let good = self.load_finished_good(finished_good_id).await?;
        let (_, pricing) = self.finished_good_pricing(&good.aggregate).await?;

        let mut sale = Sale::empty(sale_id);
        let sale_events = sale.handle(&SaleCommand::Record(RecordSale {
            sale_id,
            finished_good_id,
            sold_at,
            quantity,
            unit_price,
            discount,
            unit_cost_at_sale: pricing.unit_cost,
        }))?;

        let good_events = good.aggregate.handle(&FinishedGoodCommand::RecordSaleOut(RecordSaleOut {
            finished_good_id,
            entry_id: Uuid::now_v7(),
            sale_id: sale_id.aggregate_id(),
            quantity,
            sold_at,
        }))?;

        let mut unit = UnitOfWork::new();
        unit.stage(
            finished_good_id.aggregate_id(),
            costbook_goods::finished_good::AGGREGATE_TYPE,
            good.version,
            &good_events,
        )?;
        unit.stage(
            sale_id.aggregate_id(),
            costbook_sales::sale::AGGREGATE_TYPE,
            0,
            &sale_events,
        )?;
        self.dispatcher.commit(unit).await?;

        for event in &sale_events {
            sale.apply(event);
        }
        Ok(sale)
    }

    /// Void a sale and return its quantity to finished-good stock, atomically.
    #[instrument(skip(self, reason), err)]
    pub async fn void_sale(
        &self,
        sale_id: SaleId,
        reason: impl Into<String>,
    ) -> Result<SaleView, EngineError> {
        let reason = reason.into();

        retry_on_conflict(self.dispatcher.max_attempts(), "void_sale", || {
            self.void_attempt(sale_id, &reason)
        })
        .await?;

        info!(%sale_id, "sale voided");
        self.sale(sale_id).await
    }

    async fn void_attempt(&self, sale_id: SaleId, reason: &str) -> Result<(), AttemptError> {
        let sale = self.load_sale(sale_id).await?;
        let sale_events = sale.aggregate.handle(&SaleCommand::Void(VoidSale {
            sale_id,
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        }))?;

        let finished_good_id = sale
            .aggregate
            .finished_good_id()
            .ok_or_else(|| EngineError::not_found("finished good", sale_id))?;
        let good = self.load_finished_good(finished_good_id).await?;
        let good_events = good.aggregate.handle(&FinishedGoodCommand::ReturnSaleStock(ReturnSaleStock {
            finished_good_id,
            entry_id: Uuid::now_v7(),
            sale_id: sale_id.aggregate_id(),
            quantity: sale.aggregate.quantity(),
            occurred_at: Utc::now(),
        }))?;

        let mut unit = UnitOfWork::new();
        unit.stage(
            sale_id.aggregate_id(),
            costbook_sales::sale::AGGREGATE_TYPE,
            sale.version,
            &sale_events,
        )?;
        unit.stage(
            finished_good_id.aggregate_id(),
            costbook_goods::finished_good::AGGREGATE_TYPE,
            good.version,
            &good_events,
        )?;
        self.dispatcher.commit(unit).await?;
        Ok(())
    }
}
