use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use costbook_core::{DomainError, DomainResult, ValueObject};

/// Which unit cost a sale's profit is measured against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTiming {
    /// The finished good's current unit cost. Editing a recipe changes the
    /// reported profit of past sales.
    #[default]
    Live,
    /// The unit cost captured when the sale was recorded.
    Frozen,
}

impl CostTiming {
    pub fn select(self, live_unit_cost: Decimal, unit_cost_at_sale: Decimal) -> Decimal {
        match self {
            CostTiming::Live => live_unit_cost,
            CostTiming::Frozen => unit_cost_at_sale,
        }
    }
}

impl core::str::FromStr for CostTiming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(CostTiming::Live),
            "frozen" => Ok(CostTiming::Frozen),
            other => Err(format!("unknown cost timing '{other}'")),
        }
    }
}

/// Derived totals of one sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleFigures {
    pub gross_total: Decimal,
    pub net_total: Decimal,
    pub unit_cost: Decimal,
    pub unit_profit: Decimal,
    pub total_profit: Decimal,
    /// Total profit as a percentage of the net total; 0 when net ≤ 0.
    pub margin: Decimal,
}

impl ValueObject for SaleFigures {}

impl SaleFigures {
    /// Fails with `InvalidQuantity` when an amount leaves the decimal range.
    pub fn compute(
        quantity: Decimal,
        unit_price: Decimal,
        discount: Decimal,
        unit_cost: Decimal,
    ) -> DomainResult<Self> {
        let gross_total = unit_price.checked_mul(quantity).ok_or_else(out_of_range)?;
        let net_total = gross_total.checked_sub(discount).ok_or_else(out_of_range)?;
        let unit_profit = unit_price.checked_sub(unit_cost).ok_or_else(out_of_range)?;
        let total_profit = unit_profit
            .checked_mul(quantity)
            .and_then(|p| p.checked_sub(discount))
            .ok_or_else(out_of_range)?;
        let margin = if net_total > Decimal::ZERO {
            total_profit
                .checked_div(net_total)
                .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
                .ok_or_else(out_of_range)?
        } else {
            Decimal::ZERO
        };

        Ok(Self {
            gross_total,
            net_total,
            unit_cost,
            unit_profit,
            total_profit,
            margin,
        })
    }
}

fn out_of_range() -> DomainError {
    DomainError::invalid_quantity("sale amounts exceed the supported range")
}
