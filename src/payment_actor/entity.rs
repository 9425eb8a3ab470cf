use crate::actor_framework::Entity;
use crate::domain::{PaymentCreate, PaymentEvent, PaymentInfo, PaymentStatus};
use crate::error::StoreError;
use super::actions::{PaymentAction, PaymentActionResult};

fn target_of(event: PaymentEvent) -> PaymentStatus {
    match event {
        PaymentEvent::Succeed => PaymentStatus::Success,
        PaymentEvent::Cancel => PaymentStatus::Canceled,
        PaymentEvent::Refund => PaymentStatus::Refund,
    }
}

impl Entity for PaymentInfo {
    type Id = i64;
    type CreatePayload = PaymentCreate;
    type Patch = ();
    type Action = PaymentAction;
    type ActionResult = PaymentActionResult;

    const KIND: &'static str = "payment info";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn from_create(id: i64, payload: PaymentCreate) -> Result<Self, StoreError> {
        Ok(Self {
            id,
            amount: payload.amount,
            method: payload.method,
            status: PaymentStatus::Pending,
            payment_link: None,
            provider_reference: None,
            cancellation_reason: None,
        })
    }

    fn on_update(&mut self, _patch: ()) -> Result<(), StoreError> {
        Err(StoreError::Rejected(format!("payment info {} is updated through actions only", self.id)))
    }

    fn handle_action(&mut self, action: PaymentAction) -> Result<PaymentActionResult, StoreError> {
        match action {
            PaymentAction::AttachLink { link, reference } => {
                self.payment_link = Some(link);
                self.provider_reference = Some(reference);
                Ok(PaymentActionResult::LinkAttached)
            }
            PaymentAction::Apply { event, .. } if self.status == target_of(event) => {
                Ok(PaymentActionResult::Transitioned { from: self.status, to: self.status })
            }
            PaymentAction::Apply { event, reason } => {
                let from = self.status;
                let to = from.apply(event)?;
                self.status = to;
                if to == PaymentStatus::Canceled {
                    self.cancellation_reason = reason;
                }
                Ok(PaymentActionResult::Transitioned { from, to })
            }
        }
    }
}
