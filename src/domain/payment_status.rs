//! Payment state machine: `PENDING → {SUCCESS, CANCELED}`, `SUCCESS → REFUND`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::order_status::IllegalTransition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Success,
    Canceled,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentEvent {
    Succeed,
    Cancel,
    Refund,
}

impl PaymentStatus {
    pub fn apply(self, event: PaymentEvent) -> Result<PaymentStatus, IllegalTransition> {
        match (self, event) {
            (PaymentStatus::Pending, PaymentEvent::Succeed) => Ok(PaymentStatus::Success),
            (PaymentStatus::Pending, PaymentEvent::Cancel) => Ok(PaymentStatus::Canceled),
            (PaymentStatus::Success, PaymentEvent::Refund) => Ok(PaymentStatus::Refund),
            (from, event) => Err(IllegalTransition::new(from, event)),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Canceled | PaymentStatus::Refund)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Canceled => "CANCELED",
            PaymentStatus::Refund => "REFUND",
        };
        f.write_str(s)
    }
}
