use rust_decimal::Decimal;

/// Which order an item line belongs to. Exactly one owner, by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemOwner {
    Draft(i64),
    Order(i64),
}

/// One line of a draft or a durable order. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub id: i64,
    pub owner: ItemOwner,
    pub product_variant_id: i64,
    pub quantity: i64,
    pub price: Decimal,
    pub total_price: Decimal,
}

impl OrderItem {
    pub fn belongs_to_draft(&self, draft_id: i64) -> bool {
        self.owner == ItemOwner::Draft(draft_id)
    }
}

/// Payload for writing an item line. The line total is derived on create.
#[derive(Debug, Clone)]
pub struct OrderItemCreate {
    pub owner: ItemOwner,
    pub product_variant_id: i64,
    pub quantity: i64,
    pub price: Decimal,
}

impl OrderItemCreate {
    /// Copy of `item` owned by `owner`.
    pub fn copied_to(item: &OrderItem, owner: ItemOwner) -> Self {
        Self {
            owner,
            product_variant_id: item.product_variant_id,
            quantity: item.quantity,
            price: item.price,
        }
    }
}
