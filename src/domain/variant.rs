use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// A sellable product variant as held by the durable store.
///
/// `quantity` is the durable shelf count. It only moves when the
/// reconciliation job or the aggregator flusher applies deltas; in-flight
/// reservations live in the cache and in draft order items.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductVariant {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub image: String,
    pub price: Decimal,
    pub quantity: i64,
    /// Bumped on every write; the legacy consumer compares it optimistically.
    pub version: u64,
    /// Drafts whose sold units are already subtracted from `quantity`.
    /// Settling the same draft again leaves the row untouched.
    pub settled_drafts: BTreeSet<i64>,
}

/// Payload for creating a new variant.
#[derive(Debug, Clone)]
pub struct VariantCreate {
    pub product_id: i64,
    pub product_name: String,
    pub image: String,
    pub price: Decimal,
    pub quantity: i64,
}

/// Payload for updating an existing variant.
#[derive(Debug, Clone, Default)]
pub struct VariantPatch {
    pub price: Option<Decimal>,
    pub quantity: Option<i64>,
}
