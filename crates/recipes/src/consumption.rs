use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use costbook_core::{DomainError, DomainResult};
use costbook_materials::RawMaterialId;

use crate::recipe::Recipe;

/// Raw material quantity a production run draws from stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumption {
    pub raw_material_id: RawMaterialId,
    pub quantity: Decimal,
}

impl Recipe {
    /// Batches needed to produce `quantity_produced` units. Fractional
    /// batches scale consumption linearly.
    pub fn batches_for(&self, quantity_produced: Decimal) -> DomainResult<Decimal> {
        if self.batch_yield() <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        quantity_produced
            .checked_div(self.batch_yield())
            .ok_or_else(out_of_range)
    }

    /// Per raw material consumption for a production run.
    ///
    /// Lines sharing a raw material are merged; order follows the first line
    /// referencing each material.
    pub fn consumption_for(&self, quantity_produced: Decimal) -> DomainResult<Vec<Consumption>> {
        let batches = self.batches_for(quantity_produced)?;
        let mut merged: Vec<Consumption> = Vec::with_capacity(self.lines().len());
        for line in self.lines() {
            let quantity = line.quantity.checked_mul(batches).ok_or_else(out_of_range)?;
            match merged
                .iter_mut()
                .find(|c| c.raw_material_id == line.raw_material_id)
            {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .checked_add(quantity)
                        .ok_or_else(out_of_range)?;
                }
                None => merged.push(Consumption {
                    raw_material_id: line.raw_material_id,
                    quantity,
                }),
            }
        }
        Ok(merged)
    }
}

fn out_of_range() -> DomainError {
    DomainError::invalid_quantity("production quantity exceeds the supported range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{CreateRecipe, RecipeCommand, RecipeId, RecipeLine};
    use chrono::Utc;
    use costbook_core::Aggregate;
    use rust_decimal_macros::dec;

    fn recipe(batch_yield: Decimal, lines: Vec<RecipeLine>) -> Recipe {
        let id = RecipeId::generate();
        let mut recipe = Recipe::empty(id);
        let events = recipe
            .handle(&RecipeCommand::Create(CreateRecipe {
                recipe_id: id,
                name: "Base".to_string(),
                batch_yield,
                lines,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            recipe.apply(e);
        }
        recipe
    }

    #[test]
    fn fractional_batches_scale_linearly() {
        let milk = RawMaterialId::generate();
        let r = recipe(dec!(10), vec![RecipeLine::new(milk, dec!(200))]);

        assert_eq!(r.batches_for(dec!(5)).unwrap(), dec!(0.5));
        assert_eq!(
            r.consumption_for(dec!(5)).unwrap(),
            vec![Consumption {
                raw_material_id: milk,
                quantity: dec!(100)
            }]
        );
    }

    #[test]
    fn lines_sharing_a_material_are_merged() {
        let milk = RawMaterialId::generate();
        let sugar = RawMaterialId::generate();
        let r = recipe(
            dec!(2),
            vec![
                RecipeLine::new(milk, dec!(100)),
                RecipeLine::new(sugar, dec!(10)),
                RecipeLine::new(milk, dec!(50)),
            ],
        );

        let consumed = r.consumption_for(dec!(4)).unwrap();

        assert_eq!(consumed.len(), 2);
        assert_eq!(consumed[0].raw_material_id, milk);
        assert_eq!(consumed[0].quantity, dec!(300));
        assert_eq!(consumed[1].quantity, dec!(20));
    }

    #[test]
    fn quantities_beyond_decimal_range_are_rejected() {
        let milk = RawMaterialId::generate();
        let r = recipe(dec!(10), vec![RecipeLine::new(milk, dec!(200))]);

        let err = r.consumption_for(Decimal::MAX / dec!(2)).unwrap_err();

        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: producing k × yield consumes exactly k × each line.
            #[test]
            fn whole_batches_consume_exact_multiples(
                quantities in prop::collection::vec(1i64..=5_000, 1..8),
                batch_yield in 1i64..=200,
                k in 1i64..=50
            ) {
                let lines: Vec<RecipeLine> = quantities
                    .iter()
                    .map(|q| RecipeLine::new(RawMaterialId::generate(), Decimal::from(*q)))
                    .collect();
                let r = recipe(Decimal::from(batch_yield), lines.clone());

                let consumed = r.consumption_for(Decimal::from(k * batch_yield)).unwrap();

                prop_assert_eq!(consumed.len(), lines.len());
                for (line, c) in lines.iter().zip(&consumed) {
                    prop_assert_eq!(c.raw_material_id, line.raw_material_id);
                    prop_assert_eq!(c.quantity, line.quantity * Decimal::from(k));
                }
            }
        }
    }
}
