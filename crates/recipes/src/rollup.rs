//! Bill-of-materials cost rollup.
//!
//! Recomputed on every read from the current raw material unit costs. A line
//! whose raw material cannot be resolved costs 0 and is listed in
//! [`RecipeCost::unresolved`] so callers can surface it.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use costbook_core::ValueObject;
use costbook_materials::RawMaterialId;

use crate::recipe::{Recipe, RecipeLineId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCost {
    pub line_id: RecipeLineId,
    pub raw_material_id: RawMaterialId,
    pub quantity: Decimal,
    /// `None` when the raw material could not be resolved.
    pub unit_cost: Option<Decimal>,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeCost {
    pub lines: Vec<LineCost>,
    pub total_cost: Decimal,
    pub unit_cost: Decimal,
    pub unresolved: Vec<RawMaterialId>,
}

impl ValueObject for RecipeCost {}

impl RecipeCost {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Total and per-unit cost of `recipe` at the given raw material unit costs.
pub fn rollup(recipe: &Recipe, raw_material_costs: &HashMap<RawMaterialId, Decimal>) -> RecipeCost {
    let mut unresolved = Vec::new();
    let lines: Vec<LineCost> = recipe
        .lines()
        .iter()
        .map(|line| {
            let unit_cost = raw_material_costs.get(&line.raw_material_id).copied();
            if unit_cost.is_none() && !unresolved.contains(&line.raw_material_id) {
                unresolved.push(line.raw_material_id);
            }
            LineCost {
                line_id: line.line_id,
                raw_material_id: line.raw_material_id,
                quantity: line.quantity,
                unit_cost,
                cost: line.quantity.saturating_mul(unit_cost.unwrap_or_default()),
            }
        })
        .collect();

    let total_cost = lines
        .iter()
        .fold(Decimal::ZERO, |total, l| total.saturating_add(l.cost));

    RecipeCost {
        lines,
        total_cost,
        unit_cost: per_unit(total_cost, recipe.batch_yield()),
        unresolved,
    }
}

fn per_unit(total_cost: Decimal, batch_yield: Decimal) -> Decimal {
    if batch_yield <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    // Pins at the bound rather than panicking on a tiny yield.
    total_cost.checked_div(batch_yield).unwrap_or(Decimal::MAX)
}
