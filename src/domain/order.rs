use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{DraftOrder, OrderStatus, PaymentMethod};

/// A durable, committed customer order.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub status: OrderStatus,
    pub total: Decimal,
    pub shipping_fee: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_info_id: Option<i64>,
    pub draft_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Payload for committing an order.
#[derive(Debug, Clone)]
pub struct OrderCreate {
    pub user_id: i64,
    pub status: OrderStatus,
    pub total: Decimal,
    pub shipping_fee: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_info_id: Option<i64>,
    pub draft_id: i64,
}

impl OrderCreate {
    /// Copies the draft's header into a new order in `status`.
    pub fn from_draft(draft: &DraftOrder, status: OrderStatus) -> Self {
        Self {
            user_id: draft.user_id,
            status,
            total: draft.total,
            shipping_fee: draft.shipping_fee,
            payment_method: draft.payment_method,
            payment_info_id: draft.payment_info_id,
            draft_id: draft.id,
        }
    }
}
