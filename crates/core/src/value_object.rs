//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. In
/// this workspace every derived figure is one: a raw material's valuation, a
/// recipe's cost rollup, a finished good's pricing, a sale's profit figures.
/// They are recomputed from ledger state on every read and never stored as
/// the source of truth.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct Pricing { suggested_price: Decimal, unit_profit: Decimal }
///
/// impl ValueObject for Pricing {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
