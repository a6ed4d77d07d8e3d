use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a finished-good movement.
///
/// Raw-material rows carry the sign in the quantity itself; finished-good rows
/// carry an explicit kind. Both reduce to the same signed quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    In,
    Out,
}

impl MovementKind {
    pub fn sign(self) -> Decimal {
        match self {
            MovementKind::In => Decimal::ONE,
            MovementKind::Out => Decimal::NEGATIVE_ONE,
        }
    }

    /// Apply this direction to an unsigned quantity.
    pub fn signed(self, quantity: Decimal) -> Decimal {
        quantity.abs() * self.sign()
    }
}

/// A row in a stock ledger.
pub trait LedgerEntry {
    /// Positive for acquisitions/"in", negative for consumption/"out".
    fn signed_quantity(&self) -> Decimal;

    /// When the movement happened. Display ordering only.
    fn recorded_at(&self) -> DateTime<Utc>;
}

/// On-hand quantity derived from the full ledger.
///
/// A plain signed sum, so the order of `entries` never matters. The result
/// may be negative; clamping happens at the write boundary, not here. Sums
/// past the decimal range pin at the bound.
pub fn available_quantity<'a, E>(entries: impl IntoIterator<Item = &'a E>) -> Decimal
where
    E: LedgerEntry + 'a,
{
    entries
        .into_iter()
        .map(LedgerEntry::signed_quantity)
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Floor a stock figure at zero.
pub fn clamp_at_zero(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Entries ordered oldest first (stable for equal timestamps).
pub fn chronological<'a, E>(entries: impl IntoIterator<Item = &'a E>) -> Vec<&'a E>
where
    E: LedgerEntry + 'a,
{
    let mut sorted: Vec<&E> = entries.into_iter().collect();
    sorted.sort_by_key(|e| e.recorded_at());
    sorted
}
