use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{OrderStatus, PaymentMethod};

/// What became of a draft once its payment outcome is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Promotion {
    Undecided,
    /// Payment failed or was cancelled; the reservation was rolled back.
    Rejected,
    /// Promoted to the durable order with this id.
    Promoted(i64),
}

impl Promotion {
    pub fn is_decided(self) -> bool {
        !matches!(self, Promotion::Undecided)
    }

    pub fn order_id(self) -> Option<i64> {
        match self {
            Promotion::Promoted(id) => Some(id),
            _ => None,
        }
    }

    /// Nullable-column rendering: `None` undecided, `Some(0)` rejected.
    pub fn to_order_id(self) -> Option<i64> {
        match self {
            Promotion::Undecided => None,
            Promotion::Rejected => Some(0),
            Promotion::Promoted(id) => Some(id),
        }
    }
}

/// A provisional order staged right after a successful reservation.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftOrder {
    pub id: i64,
    pub user_id: i64,
    pub status: OrderStatus,
    pub total: Decimal,
    pub shipping_fee: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_info_id: Option<i64>,
    pub promotion: Promotion,
    pub created_at: DateTime<Utc>,
}

impl DraftOrder {
    /// Items of this draft still count against durable stock.
    pub fn holds_stock(&self) -> bool {
        self.promotion != Promotion::Rejected
    }
}

/// Payload for staging a new draft.
#[derive(Debug, Clone)]
pub struct DraftCreate {
    pub user_id: i64,
    pub total: Decimal,
    pub shipping_fee: Decimal,
    pub payment_method: PaymentMethod,
}

/// Payload for updating a draft. Promotion is deliberately absent: it only
/// changes through the `Decide` action.
#[derive(Debug, Clone, Default)]
pub struct DraftPatch {
    pub status: Option<OrderStatus>,
    pub payment_info_id: Option<i64>,
}
