//! Suggested price and realised margin of a finished good.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use costbook_core::{DomainError, DomainResult, ValueObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub unit_cost: Decimal,
    pub suggested_price: Decimal,
    pub unit_profit: Decimal,
    /// Profit as a percentage of the selling price.
    pub real_margin: Decimal,
}

impl ValueObject for Pricing {}

impl Pricing {
    /// Pricing of a good whose recipe cannot be resolved: all zeros.
    pub fn unresolved() -> Self {
        Self {
            unit_cost: Decimal::ZERO,
            suggested_price: Decimal::ZERO,
            unit_profit: Decimal::ZERO,
            real_margin: Decimal::ZERO,
        }
    }
}

/// Price a unit at `margin_percent` markup over `unit_cost`.
///
/// The markup is on cost while the realised margin is on price, so a 50%
/// markup realises 33.3%.
pub fn price(unit_cost: Decimal, margin_percent: Decimal) -> DomainResult<Pricing> {
    let markup = margin_percent
        .checked_div(Decimal::ONE_HUNDRED)
        .and_then(|m| m.checked_add(Decimal::ONE))
        .ok_or_else(out_of_range)?;
    let suggested_price = unit_cost.checked_mul(markup).ok_or_else(out_of_range)?;
    let unit_profit = suggested_price
        .checked_sub(unit_cost)
        .ok_or_else(out_of_range)?;
    let real_margin = if suggested_price <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        unit_profit
            .checked_div(suggested_price)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .ok_or_else(out_of_range)?
    };

    Ok(Pricing {
        unit_cost,
        suggested_price,
        unit_profit,
        real_margin,
    })
}

fn out_of_range() -> DomainError {
    DomainError::invalid_quantity("price exceeds the supported range")
}
