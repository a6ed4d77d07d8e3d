//! Engine configuration, read from the environment.

use std::time::Duration;

use rust_decimal::Decimal;

use costbook_sales::CostTiming;

/// Runtime knobs for the costing engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Attempts per operation when a concurrent write wins the race.
    pub max_attempts: u32,
    /// Deadline for a single event store call.
    pub store_timeout: Duration,
    /// Stock at or below this level is reported as critical.
    pub alert_critical: Decimal,
    /// Stock at or below this level (and above critical) is reported as low.
    pub alert_low: Decimal,
    /// Which unit cost sale profit figures are computed from.
    pub sale_cost_timing: CostTiming,
    /// Postgres connection string; in-memory storage when unset.
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            store_timeout: Duration::from_millis(5000),
            alert_critical: Decimal::TEN,
            alert_low: Decimal::ONE_HUNDRED,
            sale_cost_timing: CostTiming::Live,
            database_url: None,
        }
    }
}

impl EngineConfig {
    /// Read `COSTBOOK_*` variables and `DATABASE_URL`, falling back to
    /// defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            max_attempts: parse_or(&lookup, "COSTBOOK_MAX_ATTEMPTS", defaults.max_attempts),
            store_timeout: Duration::from_millis(parse_or(
                &lookup,
                "COSTBOOK_STORE_TIMEOUT_MS",
                defaults.store_timeout.as_millis() as u64,
            )),
            alert_critical: parse_or(&lookup, "COSTBOOK_ALERT_CRITICAL", defaults.alert_critical),
            alert_low: parse_or(&lookup, "COSTBOOK_ALERT_LOW", defaults.alert_low),
            sale_cost_timing: parse_or(
                &lookup,
                "COSTBOOK_SALE_COST_TIMING",
                defaults.sale_cost_timing,
            ),
            database_url: lookup("DATABASE_URL")
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            tracing::warn!(key, value = %raw, error = %e, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}
