use chrono::Utc;

use crate::actor_framework::Entity;
use crate::domain::{DraftCreate, DraftOrder, DraftPatch, OrderStatus, Promotion};
use crate::error::StoreError;
use super::actions::{DraftAction, DraftActionResult};

impl Entity for DraftOrder {
    type Id = i64;
    type CreatePayload = DraftCreate;
    type Patch = DraftPatch;
    type Action = DraftAction;
    type ActionResult = DraftActionResult;

    const KIND: &'static str = "draft order";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn from_create(id: i64, payload: DraftCreate) -> Result<Self, StoreError> {
        Ok(Self {
            id,
            user_id: payload.user_id,
            status: OrderStatus::Pending,
            total: payload.total,
            shipping_fee: payload.shipping_fee,
            payment_method: payload.payment_method,
            payment_info_id: None,
            promotion: Promotion::Undecided,
            created_at: Utc::now(),
        })
    }

    fn on_update(&mut self, patch: DraftPatch) -> Result<(), StoreError> {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(payment_info_id) = patch.payment_info_id {
            self.payment_info_id = Some(payment_info_id);
        }
        Ok(())
    }

    fn handle_action(&mut self, action: DraftAction) -> Result<DraftActionResult, StoreError> {
        match action {
            DraftAction::Decide(Promotion::Undecided) => Err(StoreError::Rejected(format!(
                "draft {} cannot be decided back to undecided",
                self.id
            ))),
            DraftAction::Decide(promotion) if self.promotion == promotion => {
                Ok(DraftActionResult::Decided { promotion, changed: false })
            }
            DraftAction::Decide(_) if self.promotion.is_decided() => Err(StoreError::Rejected(format!(
                "draft {} already decided as {:?}",
                self.id, self.promotion
            ))),
            DraftAction::Decide(promotion) => {
                self.promotion = promotion;
                if promotion == Promotion::Rejected {
                    self.status = OrderStatus::Cancelled;
                }
                Ok(DraftActionResult::Decided { promotion, changed: true })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PaymentMethod;
    use rust_decimal::Decimal;

    fn draft() -> DraftOrder {
        DraftOrder::from_create(
            1,
            DraftCreate {
                user_id: 9,
                total: Decimal::from(110),
                shipping_fee: Decimal::from(10),
                payment_method: PaymentMethod::BankTransfer,
            },
        )
        .unwrap()
    }

    #[test]
    fn decides_at_most_once() {
        let mut d = draft();
        assert_eq!(
            d.handle_action(DraftAction::Decide(Promotion::Promoted(4))).unwrap(),
            DraftActionResult::Decided { promotion: Promotion::Promoted(4), changed: true }
        );
        assert_eq!(
            d.handle_action(DraftAction::Decide(Promotion::Promoted(4))).unwrap(),
            DraftActionResult::Decided { promotion: Promotion::Promoted(4), changed: false }
        );
        assert!(d.handle_action(DraftAction::Decide(Promotion::Promoted(5))).is_err());
        assert!(d.handle_action(DraftAction::Decide(Promotion::Rejected)).is_err());
        assert_eq!(d.promotion.to_order_id(), Some(4));
    }

    #[test]
    fn rejection_cancels_the_draft() {
        let mut d = draft();
        d.handle_action(DraftAction::Decide(Promotion::Rejected)).unwrap();
        assert_eq!(d.status, OrderStatus::Cancelled);
        assert_eq!(d.promotion.to_order_id(), Some(0));
        assert!(!d.holds_stock());
    }
}
