use std::collections::BTreeMap;

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::figures::SaleFigures;
use crate::sale::Sale;

/// Totals for one calendar month (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub sale_count: usize,
    pub units: Decimal,
    pub net_revenue: Decimal,
    pub total_profit: Decimal,
}

/// Groups sales by the month they were made in, oldest month first.
/// Voided sales are left out.
pub fn summarize_by_month<'a>(
    sales: impl IntoIterator<Item = (&'a Sale, SaleFigures)>,
) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<(i32, u32), MonthlySummary> = BTreeMap::new();
    for (sale, figures) in sales {
        if sale.is_voided() {
            continue;
        }
        let key = (sale.sold_at().year(), sale.sold_at().month());
        let entry = months.entry(key).or_insert_with(|| MonthlySummary {
            year: key.0,
            month: key.1,
            sale_count: 0,
            units: Decimal::ZERO,
            net_revenue: Decimal::ZERO,
            total_profit: Decimal::ZERO,
        });
        entry.sale_count += 1;
        // Month totals pin at the decimal bound.
        entry.units = entry.units.saturating_add(sale.quantity());
        entry.net_revenue = entry.net_revenue.saturating_add(figures.net_total);
        entry.total_profit = entry.total_profit.saturating_add(figures.total_profit);
    }
    months.into_values().collect()
}
