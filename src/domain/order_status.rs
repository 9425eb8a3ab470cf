//! Order lifecycle state machine.
//!
//! ```text
//! PENDING ─confirm─► CONFIRMED ─process─► PROCESSING ─ship─► SHIPPED ─deliver─► DELIVERED ─complete─► DONE
//!    │                   │                    │                 │                    │
//!    └──cancel───────────┴──cancel────────────┘                 └──request_return────┴──► RETURN_REQUESTED
//!    ▼                                                                                          │ ship_return
//! CANCELLED                                                          RETURNED ◄─receive_return─ RETURN_SHIPPING
//! ```
//!
//! Transitions are an explicit `(state, event)` match. Anything not listed is
//! an [`IllegalTransition`]; the caller's status is never touched on failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    ReturnRequested,
    ReturnShipping,
    Returned,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderEvent {
    Confirm,
    Process,
    Ship,
    Deliver,
    Complete,
    RequestReturn,
    ShipReturn,
    ReceiveReturn,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition: {event} is not allowed from {from}")]
pub struct IllegalTransition {
    pub from: String,
    pub event: String,
}

impl IllegalTransition {
    pub(crate) fn new(from: impl fmt::Display, event: impl fmt::Debug) -> Self {
        Self {
            from: from.to_string(),
            event: format!("{:?}", event),
        }
    }
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::ReturnRequested,
        OrderStatus::ReturnShipping,
        OrderStatus::Returned,
        OrderStatus::Done,
        OrderStatus::Cancelled,
    ];

    /// Next state for `event`, or an error naming the rejected pair.
    pub fn apply(self, event: OrderEvent) -> Result<OrderStatus, IllegalTransition> {
        use OrderEvent as E;
        use OrderStatus as S;

        let next = match (self, event) {
            (S::Pending, E::Confirm) => S::Confirmed,
            (S::Confirmed, E::Process) => S::Processing,
            (S::Processing, E::Ship) => S::Shipped,
            (S::Shipped, E::Deliver) => S::Delivered,
            (S::Shipped, E::RequestReturn) => S::ReturnRequested,
            (S::Delivered, E::Complete) => S::Done,
            (S::Delivered, E::RequestReturn) => S::ReturnRequested,
            (S::ReturnRequested, E::ShipReturn) => S::ReturnShipping,
            (S::ReturnShipping, E::ReceiveReturn) => S::Returned,
            (S::Pending | S::Confirmed | S::Processing, E::Cancel) => S::Cancelled,
            (from, event) => return Err(IllegalTransition::new(from, event)),
        };
        Ok(next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Done | OrderStatus::Cancelled | OrderStatus::Returned)
    }

    /// Display/sort ordinal. Never consult this to authorize a transition.
    pub fn rank(self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Cancelled => 1,
            OrderStatus::Confirmed => 2,
            OrderStatus::Processing => 3,
            OrderStatus::Shipped => 4,
            OrderStatus::Delivered => 5,
            OrderStatus::ReturnRequested => 6,
            OrderStatus::ReturnShipping => 7,
            OrderStatus::Returned => 8,
            OrderStatus::Done => 9,
        }
    }

    pub fn is_no_later_than(self, other: OrderStatus) -> bool {
        self.rank() <= other.rank()
    }

    /// Whether the stock held by an order in this state goes back on the shelf.
    pub fn releases_stock(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::ReturnRequested => "RETURN_REQUESTED",
            OrderStatus::ReturnShipping => "RETURN_SHIPPING",
            OrderStatus::Returned => "RETURNED",
            OrderStatus::Done => "DONE",
            OrderStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}
