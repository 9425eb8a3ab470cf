use crate::domain::{OrderEvent, OrderStatus};

/// Custom actions for order rows.
#[derive(Debug, Clone)]
pub enum OrderAction {
    /// Runs the lifecycle state machine on the stored status.
    Apply(OrderEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
}
