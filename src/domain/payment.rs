use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::PaymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Cash on delivery: the draft is promoted immediately.
    CashOnDelivery,
    /// Bank transfer: promotion waits for the provider to report success.
    BankTransfer,
}

/// Payment record attached (latest wins) to a draft and later to its order.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentInfo {
    pub id: i64,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub payment_link: Option<String>,
    pub provider_reference: Option<String>,
    pub cancellation_reason: Option<String>,
}

/// Payload for opening a payment.
#[derive(Debug, Clone)]
pub struct PaymentCreate {
    pub amount: Decimal,
    pub method: PaymentMethod,
}
