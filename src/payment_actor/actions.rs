use crate::domain::{PaymentEvent, PaymentStatus};

/// Custom actions for payment rows.
#[derive(Debug, Clone)]
pub enum PaymentAction {
    AttachLink { link: String, reference: String },
    /// Runs the payment state machine. Re-applying an event whose target the
    /// payment already holds is accepted as a no-op.
    Apply { event: PaymentEvent, reason: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentActionResult {
    LinkAttached,
    Transitioned { from: PaymentStatus, to: PaymentStatus },
}

impl PaymentActionResult {
    pub fn changed(&self) -> bool {
        match self {
            PaymentActionResult::LinkAttached => true,
            PaymentActionResult::Transitioned { from, to } => from != to,
        }
    }
}
