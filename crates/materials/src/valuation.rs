//! Weighted-average valuation of a raw material.
//!
//! Two explicit costing paths: the ledger (acquisitions only) and the legacy
//! total-value/total-quantity ratio kept on materials registered before the
//! ledger existed. The ledger always wins when it has any acquisition.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use costbook_core::ValueObject;

use crate::raw_material::{LegacyValuation, UnitOfMeasure};
use crate::stock_entry::StockEntry;

/// Which data a unit cost was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostBasis {
    Ledger {
        total_cost: Decimal,
        total_quantity: Decimal,
    },
    Legacy {
        total_value: Decimal,
        total_quantity: Decimal,
    },
    Unvalued,
}

impl CostBasis {
    /// Cost per base unit (g, ml or unit); 0 when the denominator is 0.
    pub fn unit_cost(&self) -> Decimal {
        let (numerator, denominator) = match *self {
            CostBasis::Ledger {
                total_cost,
                total_quantity,
            } => (total_cost, total_quantity),
            CostBasis::Legacy {
                total_value,
                total_quantity,
            } => (total_value, total_quantity),
            CostBasis::Unvalued => return Decimal::ZERO,
        };
        if denominator <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        numerator.checked_div(denominator).unwrap_or(Decimal::MAX)
    }
}

pub fn cost_basis(entries: &[StockEntry], legacy: Option<&LegacyValuation>) -> CostBasis {
    let mut acquisitions = entries.iter().filter(|e| e.is_acquisition()).peekable();
    if acquisitions.peek().is_some() {
        let (total_cost, total_quantity) = acquisitions.fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(cost, qty), e| (cost.saturating_add(e.total_cost), qty.saturating_add(e.quantity)),
        );
        return CostBasis::Ledger {
            total_cost,
            total_quantity,
        };
    }

    match legacy {
        Some(l) => CostBasis::Legacy {
            total_value: l.total_value,
            total_quantity: l.total_quantity,
        },
        None => CostBasis::Unvalued,
    }
}

pub fn unit_cost(entries: &[StockEntry], legacy: Option<&LegacyValuation>) -> Decimal {
    cost_basis(entries, legacy).unit_cost()
}

/// Price per kilogram/litre for mass and volume units, per unit for counts.
///
/// Presentation only; costing always uses the base-unit figure.
pub fn standard_unit_price(unit_cost: Decimal, unit: UnitOfMeasure) -> Decimal {
    match unit {
        UnitOfMeasure::Grams | UnitOfMeasure::Millilitres => {
            unit_cost.saturating_mul(Decimal::ONE_THOUSAND)
        }
        UnitOfMeasure::Units => unit_cost,
    }
}

/// Derived valuation of one raw material at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    pub basis: CostBasis,
    pub unit_cost: Decimal,
    pub standard_unit_price: Decimal,
}

impl ValueObject for Valuation {}

impl Valuation {
    pub fn derive(
        entries: &[StockEntry],
        legacy: Option<&LegacyValuation>,
        unit: UnitOfMeasure,
    ) -> Self {
        let basis = cost_basis(entries, legacy);
        let unit_cost = basis.unit_cost();
        Self {
            basis,
            unit_cost,
            standard_unit_price: standard_unit_price(unit_cost, unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock_entry::{AdjustmentReason, EntrySource};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn purchase(quantity: Decimal, total_cost: Decimal) -> StockEntry {
        StockEntry {
            entry_id: Uuid::now_v7(),
            quantity,
            total_cost,
            recorded_at: Utc::now(),
            source: EntrySource::Purchase { supplier: None },
        }
    }

    fn consumption(quantity: Decimal) -> StockEntry {
        StockEntry {
            entry_id: Uuid::now_v7(),
            quantity: -quantity,
            total_cost: Decimal::ZERO,
            recorded_at: Utc::now(),
            source: EntrySource::Adjustment {
                reason: AdjustmentReason::Damage,
                note: None,
            },
        }
    }

    #[test]
    fn milk_weighted_average() {
        let entries = vec![purchase(dec!(1000), dec!(5)), purchase(dec!(500), dec!(3))];
        let cost = unit_cost(&entries, None);
        assert_eq!(cost, dec!(8) / dec!(1500));
        assert_eq!(cost.round_dp(6), dec!(0.005333));
    }

    #[test]
    fn consumption_rows_do_not_move_the_average() {
        let entries = vec![
            purchase(dec!(1000), dec!(5)),
            consumption(dec!(900)),
            purchase(dec!(500), dec!(3)),
        ];
        assert_eq!(unit_cost(&entries, None), dec!(8) / dec!(1500));
    }

    #[test]
    fn legacy_ratio_used_without_acquisitions() {
        let legacy = LegacyValuation {
            total_quantity: dec!(2000),
            total_value: dec!(12),
        };
        let entries = vec![consumption(dec!(10))];
        assert_eq!(
            cost_basis(&entries, Some(&legacy)),
            CostBasis::Legacy {
                total_value: dec!(12),
                total_quantity: dec!(2000)
            }
        );
        assert_eq!(unit_cost(&entries, Some(&legacy)), dec!(0.006));
    }

    #[test]
    fn ledger_wins_over_legacy() {
        let legacy = LegacyValuation {
            total_quantity: dec!(1),
            total_value: dec!(999),
        };
        let entries = vec![purchase(dec!(10), dec!(20))];
        assert_eq!(unit_cost(&entries, Some(&legacy)), dec!(2));
    }

    #[test]
    fn zero_denominators_cost_zero() {
        assert_eq!(unit_cost(&[], None), Decimal::ZERO);
        let legacy = LegacyValuation {
            total_quantity: Decimal::ZERO,
            total_value: dec!(50),
        };
        assert_eq!(unit_cost(&[], Some(&legacy)), Decimal::ZERO);
    }

    #[test]
    fn standard_price_scales_mass_and_volume_only() {
        assert_eq!(standard_unit_price(dec!(0.005), UnitOfMeasure::Grams), dec!(5));
        assert_eq!(
            standard_unit_price(dec!(0.002), UnitOfMeasure::Millilitres),
            dec!(2)
        );
        assert_eq!(standard_unit_price(dec!(0.75), UnitOfMeasure::Units), dec!(0.75));
    }

    #[test]
    fn valuation_reports_basis_and_prices() {
        let entries = vec![purchase(dec!(1000), dec!(5)), purchase(dec!(500), dec!(3))];
        let v = Valuation::derive(&entries, None, UnitOfMeasure::Grams);
        assert!(matches!(v.basis, CostBasis::Ledger { .. }));
        assert_eq!(v.standard_unit_price.round_dp(3), dec!(5.333));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: unit cost is Σcost / Σquantity over acquisitions.
            #[test]
            fn unit_cost_is_weighted_average(
                rows in prop::collection::vec((1i64..=100_000, 0i64..=1_000_000), 1..20),
                outs in prop::collection::vec(1i64..=50_000, 0..10)
            ) {
                let mut entries: Vec<StockEntry> = rows
                    .iter()
                    .map(|(q, c)| purchase(Decimal::from(*q), Decimal::new(*c, 2)))
                    .collect();
                entries.extend(outs.iter().map(|q| consumption(Decimal::from(*q))));

                let total_cost: Decimal = rows.iter().map(|(_, c)| Decimal::new(*c, 2)).sum();
                let total_qty: Decimal = rows.iter().map(|(q, _)| Decimal::from(*q)).sum();

                prop_assert_eq!(unit_cost(&entries, None), total_cost / total_qty);
            }

            /// Property: without acquisitions the legacy ratio applies.
            #[test]
            fn legacy_fallback_without_acquisitions(
                total_quantity in 1i64..=1_000_000,
                total_value in 0i64..=1_000_000,
                outs in prop::collection::vec(1i64..=50_000, 0..10)
            ) {
                let legacy = LegacyValuation {
                    total_quantity: Decimal::from(total_quantity),
                    total_value: Decimal::new(total_value, 2),
                };
                let entries: Vec<StockEntry> =
                    outs.iter().map(|q| consumption(Decimal::from(*q))).collect();

                prop_assert_eq!(
                    unit_cost(&entries, Some(&legacy)),
                    legacy.total_value / legacy.total_quantity
                );
            }
        }
    }
}
