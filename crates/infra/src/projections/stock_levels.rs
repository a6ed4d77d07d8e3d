use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use costbook_core::AggregateId;
use costbook_events::EventEnvelope;
use costbook_goods::FinishedGoodEvent;
use costbook_ledger::LedgerEntry;
use costbook_materials::RawMaterialEvent;

use crate::read_model::ReadModelStore;

/// Which ledger a stock level belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StockItemKind {
    RawMaterial,
    FinishedGood,
}

/// Queryable read model: current on-hand quantity per item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub aggregate_id: AggregateId,
    pub kind: StockItemKind,
    pub name: String,
    pub quantity: Decimal,
    /// Business time of the last stock movement applied.
    pub last_movement_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum StockLevelsProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("event does not belong to stream {0}")]
    StreamMismatch(AggregateId),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection cursor lock poisoned")]
    Poisoned,
}

/// Stock level projection over both ledgers.
///
/// Raw materials take the persisted running total (`stock_after`), so a
/// clamped production reads as zero here. Finished goods sum signed ledger
/// rows. Envelopes from other aggregate types only advance the cursor.
#[derive(Debug)]
pub struct StockLevelsProjection<S>
where
    S: ReadModelStore<AggregateId, StockLevel>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> StockLevelsProjection<S>
where
    S: ReadModelStore<AggregateId, StockLevel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, aggregate_id: &AggregateId) -> Option<StockLevel> {
        self.store.get(aggregate_id)
    }

    /// All tracked items, sorted by name.
    pub fn list(&self) -> Vec<StockLevel> {
        let mut levels = self.store.list();
        levels.sort_by(|a, b| a.name.cmp(&b.name));
        levels
    }

    /// Apply a published envelope into the projection.
    ///
    /// Idempotent for at-least-once delivery: replays at or below the
    /// stream cursor are ignored.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockLevelsProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| StockLevelsProjectionError::Poisoned)?;
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);

        if seq == 0 {
            return Err(StockLevelsProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(StockLevelsProjectionError::NonMonotonicSequence { last, found: seq });
        }

        match envelope.aggregate_type() {
            costbook_materials::raw_material::AGGREGATE_TYPE => {
                let event: RawMaterialEvent = serde_json::from_value(envelope.payload().clone())
                    .map_err(|e| StockLevelsProjectionError::Deserialize(e.to_string()))?;
                self.apply_raw_material(aggregate_id, envelope.occurred_at(), event)?;
            }
            costbook_goods::finished_good::AGGREGATE_TYPE => {
                let event: FinishedGoodEvent = serde_json::from_value(envelope.payload().clone())
                    .map_err(|e| StockLevelsProjectionError::Deserialize(e.to_string()))?;
                self.apply_finished_good(aggregate_id, envelope.occurred_at(), event)?;
            }
            _ => {}
        }

        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    fn apply_raw_material(
        &self,
        aggregate_id: AggregateId,
        occurred_at: DateTime<Utc>,
        event: RawMaterialEvent,
    ) -> Result<(), StockLevelsProjectionError> {
        match event {
            RawMaterialEvent::RawMaterialRegistered(e) => {
                ensure_stream(aggregate_id, e.raw_material_id.aggregate_id())?;
                self.store.upsert(
                    aggregate_id,
                    StockLevel {
                        aggregate_id,
                        kind: StockItemKind::RawMaterial,
                        name: e.name,
                        quantity: e.legacy.map(|l| l.total_quantity).unwrap_or(Decimal::ZERO),
                        last_movement_at: None,
                    },
                );
            }
            RawMaterialEvent::RawMaterialUpdated(e) => {
                ensure_stream(aggregate_id, e.raw_material_id.aggregate_id())?;
                let mut level = self.level_or_default(aggregate_id, StockItemKind::RawMaterial);
                level.name = e.name;
                self.store.upsert(aggregate_id, level);
            }
            RawMaterialEvent::StockEntryRecorded(e) => {
                ensure_stream(aggregate_id, e.raw_material_id.aggregate_id())?;
                let mut level = self.level_or_default(aggregate_id, StockItemKind::RawMaterial);
                level.quantity = e.stock_after;
                level.last_movement_at = Some(occurred_at);
                self.store.upsert(aggregate_id, level);
            }
            RawMaterialEvent::RawMaterialDeleted(e) => {
                ensure_stream(aggregate_id, e.raw_material_id.aggregate_id())?;
                self.store.remove(&aggregate_id);
            }
        }
        Ok(())
    }

    fn apply_finished_good(
        &self,
        aggregate_id: AggregateId,
        occurred_at: DateTime<Utc>,
        event: FinishedGoodEvent,
    ) -> Result<(), StockLevelsProjectionError> {
        match event {
            FinishedGoodEvent::FinishedGoodCreated(e) => {
                ensure_stream(aggregate_id, e.finished_good_id.aggregate_id())?;
                self.store.upsert(
                    aggregate_id,
                    StockLevel {
                        aggregate_id,
                        kind: StockItemKind::FinishedGood,
                        name: e.name,
                        quantity: Decimal::ZERO,
                        last_movement_at: None,
                    },
                );
            }
            FinishedGoodEvent::FinishedGoodUpdated(e) => {
                ensure_stream(aggregate_id, e.finished_good_id.aggregate_id())?;
                let mut level = self.level_or_default(aggregate_id, StockItemKind::FinishedGood);
                level.name = e.name;
                self.store.upsert(aggregate_id, level);
            }
            FinishedGoodEvent::GoodsStockRecorded(e) => {
                ensure_stream(aggregate_id, e.finished_good_id.aggregate_id())?;
                let mut level = self.level_or_default(aggregate_id, StockItemKind::FinishedGood);
                level.quantity = level.quantity.saturating_add(e.entry.signed_quantity());
                level.last_movement_at = Some(occurred_at);
                self.store.upsert(aggregate_id, level);
            }
            FinishedGoodEvent::FinishedGoodStatusChanged(_) => {}
            FinishedGoodEvent::FinishedGoodDeleted(e) => {
                ensure_stream(aggregate_id, e.finished_good_id.aggregate_id())?;
                self.store.remove(&aggregate_id);
            }
        }
        Ok(())
    }

    fn level_or_default(&self, aggregate_id: AggregateId, kind: StockItemKind) -> StockLevel {
        self.store.get(&aggregate_id).unwrap_or(StockLevel {
            aggregate_id,
            kind,
            name: String::new(),
            quantity: Decimal::ZERO,
            last_movement_at: None,
        })
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), StockLevelsProjectionError> {
        self.cursors
            .write()
            .map_err(|_| StockLevelsProjectionError::Poisoned)?
            .clear();
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        // Deterministic replay order: aggregate, sequence.
        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

fn ensure_stream(
    envelope_id: AggregateId,
    event_id: AggregateId,
) -> Result<(), StockLevelsProjectionError> {
    if envelope_id == event_id {
        Ok(())
    } else {
        Err(StockLevelsProjectionError::StreamMismatch(envelope_id))
    }
}
