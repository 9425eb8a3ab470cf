use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DraftCreate, DraftOrder, Order, OrderItem, PaymentInfo, PaymentMethod};
use crate::cache::{ReservationLine, ReservationRequest};
use crate::error::OrderError;

/// One requested line as submitted by the buyer, price included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub variant_id: i64,
    pub quantity: i64,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: i64,
    pub lines: Vec<CheckoutLine>,
    pub shipping_fee: Decimal,
    /// Client-computed grand total, shipping included.
    pub total: Decimal,
    pub payment_method: PaymentMethod,
}

impl CheckoutRequest {
    /// Shape checks that need no stock or price knowledge.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.lines.is_empty() {
            return Err(OrderError::Validation("order has no lines".to_string()));
        }
        if let Some(line) = self.lines.iter().find(|l| l.quantity <= 0) {
            return Err(OrderError::Validation(format!(
                "quantity for variant {} must be positive",
                line.variant_id
            )));
        }
        if let Some(line) = self.lines.iter().find(|l| l.price < Decimal::ZERO) {
            return Err(OrderError::Validation(format!(
                "price for variant {} must not be negative",
                line.variant_id
            )));
        }
        if self.shipping_fee < Decimal::ZERO {
            return Err(OrderError::Validation("shipping fee must not be negative".to_string()));
        }
        if self.total < self.shipping_fee {
            return Err(OrderError::Validation("total is below the shipping fee".to_string()));
        }
        Ok(())
    }

    pub fn subtotal(&self) -> Decimal {
        self.total - self.shipping_fee
    }

    pub fn reservation_lines(&self) -> Vec<ReservationLine> {
        self.lines
            .iter()
            .map(|line| ReservationLine {
                variant_id: line.variant_id,
                quantity: line.quantity,
                unit_price: line.price,
            })
            .collect()
    }

    pub fn reservation(&self) -> ReservationRequest {
        ReservationRequest {
            lines: self.reservation_lines(),
            expected_subtotal: self.subtotal(),
        }
    }

    pub fn draft(&self) -> DraftCreate {
        DraftCreate {
            user_id: self.user_id,
            total: self.total,
            shipping_fee: self.shipping_fee,
            payment_method: self.payment_method,
        }
    }
}

/// What a successful checkout hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutReceipt {
    /// Cash on delivery: the durable order exists already.
    Placed {
        draft: DraftOrder,
        order: Order,
        items: Vec<OrderItem>,
        payment: PaymentInfo,
    },
    /// Bank transfer: provisional until the watcher sees the payment settle.
    AwaitingPayment {
        draft: DraftOrder,
        items: Vec<OrderItem>,
        payment: PaymentInfo,
        payment_link: String,
    },
}

impl CheckoutReceipt {
    pub fn draft(&self) -> &DraftOrder {
        match self {
            CheckoutReceipt::Placed { draft, .. } | CheckoutReceipt::AwaitingPayment { draft, .. } => draft,
        }
    }

    pub fn order(&self) -> Option<&Order> {
        match self {
            CheckoutReceipt::Placed { order, .. } => Some(order),
            CheckoutReceipt::AwaitingPayment { .. } => None,
        }
    }
}
